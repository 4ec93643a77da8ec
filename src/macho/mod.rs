//! Mach-O file format handling.
//!
//! This module reads the parts of a Mach-O file that describe a library's
//! interface: the container (thin or fat), each architecture's load commands,
//! the export trie, and the classic symbol table. Nothing here allocates per
//! byte of input; decoders borrow from the mapped file and report what they
//! find through callbacks.

mod constants;
mod file;
mod load_commands;
mod structs;
mod symtab;
mod trie;

#[cfg(test)]
pub(crate) mod testutil;

pub use constants::*;
pub use file::*;
pub use load_commands::*;
pub use structs::*;
pub use symtab::*;
pub use trie::*;
