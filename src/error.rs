//! Error types for Mach-O parsing and stub generation.
//!
//! Errors fall into four families:
//! - structural errors caused by malformed input bytes,
//! - resource errors (I/O and allocation failures),
//! - consistency conflicts between architectures or duplicate load commands,
//! - writer errors.
//!
//! Leniency-tolerable defects (a symbol with a bad string index, an unknown
//! load command) never surface as errors.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// The kind of cross-command or cross-architecture disagreement detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictKind {
    /// The same architecture appears twice in one file.
    DuplicateArchitecture,
    /// `LC_ID_DYLIB` install names differ.
    InstallName,
    /// `LC_ID_DYLIB` current versions differ.
    CurrentVersion,
    /// `LC_ID_DYLIB` compatibility versions differ.
    CompatibilityVersion,
    /// Build-version / version-min platforms differ.
    Platform,
    /// Multiple `LC_UUID` commands with different values in one architecture.
    Uuid,
    /// Two architectures share the same UUID.
    NonUniqueUuid,
    /// Header flags (two-level namespace, app-extension-safe) differ.
    Flags,
    /// ObjC image-info constraints differ.
    ObjcConstraint,
    /// Swift versions differ.
    SwiftVersion,
    /// Multiple parent umbrellas where the output format allows only one.
    ParentUmbrella,
}

impl ConflictKind {
    /// Returns a short human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            ConflictKind::DuplicateArchitecture => "duplicate architecture",
            ConflictKind::InstallName => "conflicting install names",
            ConflictKind::CurrentVersion => "conflicting current versions",
            ConflictKind::CompatibilityVersion => "conflicting compatibility versions",
            ConflictKind::Platform => "conflicting platforms",
            ConflictKind::Uuid => "conflicting uuids",
            ConflictKind::NonUniqueUuid => "non-unique uuid",
            ConflictKind::Flags => "conflicting header flags",
            ConflictKind::ObjcConstraint => "conflicting objc constraints",
            ConflictKind::SwiftVersion => "conflicting swift versions",
            ConflictKind::ParentUmbrella => "conflicting parent umbrellas",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// The main error type for parsing and writing.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to memory map file '{path}': {source}")]
    MemoryMap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write output file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("out of memory while growing a buffer to {requested} elements")]
    OutOfMemory { requested: usize },

    #[error("parse cancelled")]
    Cancelled,

    // ==================== Container Errors ====================
    #[error("not a Mach-O file (magic {0:#x})")]
    InvalidMagic(u32),

    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: u64, available: u64 },

    #[error("invalid fat header: {reason}")]
    InvalidFatHeader { reason: &'static str },

    #[error("fat architecture {index} lies outside the file")]
    FatArchOutOfBounds { index: usize },

    #[error("fat architectures {first} and {second} overlap")]
    FatArchOverlap { first: usize, second: usize },

    #[error("fat architecture {index} does not match its Mach-O header")]
    FatArchMismatch { index: usize },

    #[error("file contains no architectures")]
    NoArchitectures,

    #[error("unsupported cpu type {cputype:#x} (subtype {cpusubtype:#x})")]
    UnsupportedCpu { cputype: u32, cpusubtype: u32 },

    #[error("unsupported Mach-O file type {0:#x}")]
    UnsupportedFileType(u32),

    // ==================== Load Command Errors ====================
    #[error("Mach-O has no load commands")]
    NoLoadCommands,

    #[error("load-command area is too small for {ncmds} commands ({sizeofcmds} bytes)")]
    LoadCommandsTooSmall { ncmds: u32, sizeofcmds: u32 },

    #[error("load commands extend beyond the architecture's bytes")]
    LoadCommandsOutOfBounds,

    #[error("load command {index} overflows the load-command area")]
    LoadCommandOverflow { index: u32 },

    #[error("invalid load command {index}: {reason}")]
    InvalidLoadCommand { index: u32, reason: &'static str },

    #[error("invalid install name in load command {index}")]
    InvalidInstallName { index: u32 },

    #[error("invalid re-exported library path in load command {index}")]
    InvalidReexport { index: u32 },

    #[error("invalid client name in load command {index}")]
    InvalidClient { index: u32 },

    #[error("invalid parent umbrella in load command {index}")]
    InvalidParentUmbrella { index: u32 },

    #[error("unknown platform {0}")]
    InvalidPlatform(u32),

    #[error("dynamic library has no LC_ID_DYLIB command")]
    MissingIdentification,

    #[error("architecture {arch} has no uuid")]
    MissingUuid { arch: &'static str },

    #[error("architecture {arch} has no platform")]
    MissingPlatform { arch: &'static str },

    #[error("invalid section in segment command {index}")]
    InvalidSection { index: u32 },

    #[error("invalid objc image info")]
    InvalidObjcImageInfo,

    // ==================== Symbol Errors ====================
    #[error("Mach-O has neither a symbol table nor an export trie")]
    NoSymbolTable,

    #[error("invalid symbol table: {reason}")]
    InvalidSymbolTable { reason: &'static str },

    #[error("invalid string table: {reason}")]
    InvalidStringTable { reason: &'static str },

    #[error("symbol table and string table overlap")]
    OverlappingSymbolTables,

    #[error("invalid export trie at offset {offset:#x}")]
    InvalidExportsTrie { offset: u64 },

    #[error("invalid ULEB128 at offset {offset:#x}")]
    InvalidUleb128 { offset: u64 },

    #[error("library exports no symbols")]
    NoExports,

    // ==================== Consistency Errors ====================
    #[error("{kind} in architecture {arch}")]
    Conflict {
        kind: ConflictKind,
        arch: &'static str,
    },
}

/// A specialized Result type for parsing and writing.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if the error was caused by malformed input bytes.
    #[inline]
    pub fn is_structural(&self) -> bool {
        !self.is_resource() && !self.is_conflict() && !matches!(self, Error::Cancelled)
    }

    /// Returns true for I/O and allocation failures.
    ///
    /// Callers may retry these; structural errors will fail again.
    #[inline]
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::FileOpen { .. }
                | Error::MemoryMap { .. }
                | Error::FileWrite { .. }
                | Error::OutOfMemory { .. }
        )
    }

    /// Returns true if this error is a consistency conflict the policy declined.
    #[inline]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Creates an invalid load command error.
    #[inline]
    pub fn invalid_load_command(index: u32, reason: &'static str) -> Self {
        Error::InvalidLoadCommand { index, reason }
    }

    /// Creates a buffer too small error.
    #[inline]
    pub fn buffer_too_small(needed: u64, available: u64) -> Self {
        Error::BufferTooSmall { needed, available }
    }

    /// Creates an export trie error.
    #[inline]
    pub fn invalid_trie(offset: u64) -> Self {
        Error::InvalidExportsTrie { offset }
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory { requested: 0 }
    }
}
