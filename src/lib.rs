//! tbdgen - Derive text-based stub (.tbd) files from Mach-O libraries.
//!
//! A text-based stub describes the interface of a dynamic library (install
//! name, versions, architectures, exported symbols) without its code. This
//! crate reads thin or universal Mach-O files, merges what every architecture
//! exports into one description, and writes it in any of the four stub
//! dialects.
//!
//! # Features
//!
//! - Memory-mapped input, bounds-checked decoding
//! - Thin and fat (32- and 64-bit) containers, either byte order
//! - Export trie and classic symbol table decoding
//! - Caller-controlled handling of conflicts between architectures
//! - Output for stub dialects v1 through v4
//!
//! # Example
//!
//! ```no_run
//! use tbdgen::{parse_file, write_tbd_to_path, ParseOptions, RejectConflicts, TbdVersion, WriteOptions};
//!
//! fn main() -> tbdgen::Result<()> {
//!     let info = parse_file(
//!         "/usr/lib/libz.dylib",
//!         ParseOptions::empty(),
//!         TbdVersion::V4,
//!         &mut RejectConflicts,
//!     )?;
//!     write_tbd_to_path(&info, WriteOptions::empty(), "out/libz.tbd")?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bit_list;
pub mod cursor;
pub mod error;
pub mod macho;
pub mod range;
pub mod target;
pub mod tbd;

// Re-export main types
pub use error::{ConflictKind, Error, Result};
pub use target::{ArchInfo, Platform, Target, TargetList};
pub use tbd::{
    write_tbd, write_tbd_to_path, write_tbd_to_string, ConflictPolicy, Continuation, CreateInfo,
    IgnoreConflicts, ParseOptions, ParseSession, RejectConflicts, TbdVersion, WriteOptions,
};

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::debug;

/// Parses a Mach-O file held in memory.
pub fn parse_bytes(
    data: &[u8],
    options: ParseOptions,
    version: TbdVersion,
    policy: &mut dyn ConflictPolicy,
) -> Result<CreateInfo> {
    ParseSession::new(policy)
        .with_options(options)
        .with_version(version)
        .parse(data)
}

/// Maps the file at `path` read-only.
pub fn map_file<P: AsRef<Path>>(path: P) -> Result<Mmap> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|e| Error::FileOpen {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MemoryMap {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!("Mapped {} ({} bytes)", path.display(), mmap.len());
    Ok(mmap)
}

/// Maps the file at `path` and parses it.
///
/// # Arguments
///
/// * `path` - Mach-O file to read
/// * `options` - Parse leniency flags
/// * `version` - Dialect the symbols are classified for
/// * `policy` - Decides whether conflicts between architectures are fatal
pub fn parse_file<P: AsRef<Path>>(
    path: P,
    options: ParseOptions,
    version: TbdVersion,
    policy: &mut dyn ConflictPolicy,
) -> Result<CreateInfo> {
    let mmap = map_file(path)?;
    parse_bytes(&mmap, options, version, policy)
}
