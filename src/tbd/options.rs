//! Parse and write options.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

bitflags! {
    /// Leniency and extraction switches for parsing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParseOptions: u32 {
        /// Accept architectures without an `LC_UUID`
        const IGNORE_MISSING_UUIDS = 1 << 0;
        /// Do not collect exported symbols
        const IGNORE_EXPORTS = 1 << 1;
        /// Do not collect undefined symbols
        const IGNORE_UNDEFINEDS = 1 << 2;
        /// Include non-external normal symbols
        const ALLOW_PRIVATE_NORMAL_SYMBOLS = 1 << 3;
        /// Include non-external weak symbols
        const ALLOW_PRIVATE_WEAK_SYMBOLS = 1 << 4;
        /// Include non-external Objective-C classes
        const ALLOW_PRIVATE_OBJC_CLASS_SYMBOLS = 1 << 5;
        /// Include non-external Objective-C exception types
        const ALLOW_PRIVATE_OBJC_EHTYPE_SYMBOLS = 1 << 6;
        /// Include non-external Objective-C instance variables
        const ALLOW_PRIVATE_OBJC_IVAR_SYMBOLS = 1 << 7;
        /// Fail if the file exports nothing
        const ENFORCE_HAS_EXPORTS = 1 << 8;
        /// Mark every item as present in every architecture
        const IGNORE_TARGETS = 1 << 9;
        /// Accept architectures without a platform load command
        const IGNORE_MISSING_PLATFORM = 1 << 10;
        /// Do not read Objective-C image info for the constraint
        const IGNORE_OBJC_CONSTRAINT = 1 << 11;
        /// Do not read Objective-C image info for the swift version
        const IGNORE_SWIFT_VERSION = 1 << 12;
        /// Decode the symbol table even when an export trie exists
        const USE_SYMBOL_TABLE = 1 << 13;
        /// Accept images that are not dynamic libraries
        const ALLOW_NON_DYLIB = 1 << 14;

        /// All private-symbol switches
        const ALLOW_ALL_PRIVATE_SYMBOLS = Self::ALLOW_PRIVATE_NORMAL_SYMBOLS.bits()
            | Self::ALLOW_PRIVATE_WEAK_SYMBOLS.bits()
            | Self::ALLOW_PRIVATE_OBJC_CLASS_SYMBOLS.bits()
            | Self::ALLOW_PRIVATE_OBJC_EHTYPE_SYMBOLS.bits()
            | Self::ALLOW_PRIVATE_OBJC_IVAR_SYMBOLS.bits();
    }
}

impl ParseOptions {
    /// Returns true if the Objective-C image info must be located.
    #[inline]
    pub fn needs_objc_info(self) -> bool {
        !self.contains(Self::IGNORE_OBJC_CONSTRAINT | Self::IGNORE_SWIFT_VERSION)
    }
}

bitflags! {
    /// Sections and orderings of the written document.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WriteOptions: u32 {
        /// List architectures in architecture-table order instead of file order
        const ORDER_BY_ARCHITECTURE_TABLE = 1 << 0;
        /// Omit the uuids section
        const IGNORE_UUIDS = 1 << 1;
        /// Omit the flags line
        const IGNORE_FLAGS = 1 << 2;
        /// Omit the current version
        const IGNORE_CURRENT_VERSION = 1 << 3;
        /// Omit the compatibility version
        const IGNORE_COMPATIBILITY_VERSION = 1 << 4;
        /// Omit the undefineds section
        const IGNORE_UNDEFINEDS = 1 << 5;
        /// Omit the parent umbrella
        const IGNORE_PARENT_UMBRELLA = 1 << 6;
        /// Omit allowable clients
        const IGNORE_CLIENTS = 1 << 7;
        /// Omit re-exported libraries
        const IGNORE_REEXPORTS = 1 << 8;
        /// Omit the `...` end-of-document marker
        const IGNORE_FOOTER = 1 << 9;
    }
}

/// Output dialect of the text stub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TbdVersion {
    /// Untagged document, `archs` plus a flat export list
    V1,
    /// `!tapi-tbd-v2`
    #[default]
    V2,
    /// `!tapi-tbd-v3`
    V3,
    /// `!tapi-tbd` with `tbd-version: 4` and targets
    V4,
}

impl TbdVersion {
    /// All versions, oldest first.
    pub const ALL: [TbdVersion; 4] = [Self::V1, Self::V2, Self::V3, Self::V4];

    /// Returns the document marker line.
    pub fn header(self) -> &'static str {
        match self {
            Self::V1 => "---",
            Self::V2 => "--- !tapi-tbd-v2",
            Self::V3 => "--- !tapi-tbd-v3",
            Self::V4 => "--- !tapi-tbd",
        }
    }

    /// Returns true if Objective-C names lose their leading underscore.
    #[inline]
    pub fn strips_objc_underscore(self) -> bool {
        self >= Self::V3
    }

    /// Returns true if the dialect has an `objc-eh-types` category.
    #[inline]
    pub fn has_objc_eh_types(self) -> bool {
        self >= Self::V3
    }
}

impl fmt::Display for TbdVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
            Self::V4 => "v4",
        };
        f.write_str(name)
    }
}

impl FromStr for TbdVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim_start_matches(['v', 'V']) {
            "1" => Ok(Self::V1),
            "2" => Ok(Self::V2),
            "3" => Ok(Self::V3),
            "4" => Ok(Self::V4),
            _ => Err(format!("unknown tbd version '{s}' (expected v1, v2, v3 or v4)")),
        }
    }
}
