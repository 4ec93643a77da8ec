//! Text-based stub generation.
//!
//! Parsing builds a [`CreateInfo`] from every architecture of a Mach-O file;
//! the writer serializes it in one of the four `.tbd` dialects.

pub mod conflict;
mod create_info;
mod options;
mod parse;
mod writer;
mod yaml;

pub use conflict::{ConflictPolicy, Continuation, IgnoreConflicts, RejectConflicts};
pub use create_info::*;
pub use options::*;
pub use parse::*;
pub use writer::*;
pub use yaml::{needs_quotes, quote, quoting_for, Quoting};
