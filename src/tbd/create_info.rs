//! The aggregated description of a library across all its architectures.
//!
//! Symbols and metadata strings are deduplicated by content. Each entry keeps
//! a [`BitList`] whose bit `i` records that the entry was seen in the `i`-th
//! target of [`CreateInfo::targets`]. Scalar fields follow a first-write-wins
//! rule: a later, different value is a conflict routed through the caller's
//! [`ConflictPolicy`].

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use bitflags::bitflags;

use super::conflict::{resolve, ConflictPolicy};
use super::options::{ParseOptions, TbdVersion};
use crate::bit_list::BitList;
use crate::error::{ConflictKind, Result};
use crate::macho::{MachOFlags, ObjcConstraint};
use crate::target::{ArchInfo, Platform, Target, TargetList};

// =============================================================================
// Symbol Categories
// =============================================================================

/// Category of an exported or undefined symbol.
///
/// The declaration order is the order symbols are stored and written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)] // Variants are self-documenting via names
pub enum SymbolType {
    Normal,
    ObjcClass,
    ObjcIvar,
    ObjcEhType,
    Weak,
    ThreadLocal,
}

/// Whether a symbol is defined by the library or imported by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)] // Variants are self-documenting via names
pub enum MetaType {
    Export,
    Undefined,
}

/// Category of a metadata string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKind {
    /// `LC_SUB_FRAMEWORK` umbrella name
    ParentUmbrella,
    /// `LC_SUB_CLIENT` allowable client
    Client,
    /// `LC_REEXPORT_DYLIB` install name
    Reexport,
}

bitflags! {
    /// Stub-level header flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TbdFlags: u32 {
        /// The library does not use two-level namespaces
        const FLAT_NAMESPACE = 1 << 0;
        /// The library is not safe to link from app extensions
        const NOT_APP_EXTENSION_SAFE = 1 << 1;
    }
}

impl TbdFlags {
    /// Derives stub flags from a Mach-O header.
    pub fn from_header(flags: MachOFlags) -> Self {
        let mut out = Self::empty();
        if !flags.contains(MachOFlags::TWOLEVEL) {
            out |= Self::FLAT_NAMESPACE;
        }
        if !flags.contains(MachOFlags::APP_EXTENSION_SAFE) {
            out |= Self::NOT_APP_EXTENSION_SAFE;
        }
        out
    }
}

// =============================================================================
// Entries
// =============================================================================

/// A deduplicated symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Raw name bytes, prefix already stripped
    pub name: Vec<u8>,
    /// Category
    pub kind: SymbolType,
    /// Exported or undefined
    pub meta: MetaType,
    /// Targets the symbol was seen in
    pub targets: BitList,
}

impl SymbolInfo {
    #[inline]
    fn key_cmp(&self, meta: MetaType, kind: SymbolType, name: &[u8]) -> Ordering {
        self.meta
            .cmp(&meta)
            .then(self.kind.cmp(&kind))
            .then_with(|| self.name.as_slice().cmp(name))
    }

    /// Returns the name for display, replacing invalid UTF-8.
    #[inline]
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// A deduplicated metadata string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataInfo {
    /// The raw string bytes
    pub value: Vec<u8>,
    /// Category
    pub kind: MetadataKind,
    /// Targets the string was seen in
    pub targets: BitList,
}

impl MetadataInfo {
    /// Returns the value for display, replacing invalid UTF-8.
    #[inline]
    pub fn value_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// The UUID of one architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidInfo {
    /// Architecture (and platform) the UUID belongs to
    pub target: Target,
    /// Raw UUID bytes
    pub uuid: [u8; 16],
}

impl UuidInfo {
    /// Formats the UUID in the canonical 8-4-4-4-12 upper-case form.
    pub fn uuid_string(&self) -> String {
        let u = &self.uuid;
        format!(
            "{:02X}{:02X}{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            u[0], u[1], u[2], u[3], u[4], u[5], u[6], u[7],
            u[8], u[9], u[10], u[11], u[12], u[13], u[14], u[15]
        )
    }
}

/// A version packed as `xxxx.yy.zz` in one 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackedVersion(pub u32);

impl PackedVersion {
    /// Major component.
    #[inline]
    pub fn major(self) -> u32 {
        self.0 >> 16
    }

    /// Minor component.
    #[inline]
    pub fn minor(self) -> u32 {
        (self.0 >> 8) & 0xFF
    }

    /// Patch component.
    #[inline]
    pub fn patch(self) -> u32 {
        self.0 & 0xFF
    }
}

impl fmt::Display for PackedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major())?;
        if self.minor() != 0 || self.patch() != 0 {
            write!(f, ".{}", self.minor())?;
        }
        if self.patch() != 0 {
            write!(f, ".{}", self.patch())?;
        }
        Ok(())
    }
}

// =============================================================================
// Create Info
// =============================================================================

/// Everything a stub file says about a library.
#[derive(Debug, Clone)]
pub struct CreateInfo {
    /// Output dialect the symbols were classified for
    pub version: TbdVersion,
    /// One target per architecture, in the order they were parsed
    pub targets: TargetList,
    /// Platforms shared by every architecture (two for zippered libraries)
    pub platforms: Vec<Platform>,
    /// `LC_ID_DYLIB` install name
    pub install_name: Option<Vec<u8>>,
    /// `LC_ID_DYLIB` current version
    pub current_version: Option<PackedVersion>,
    /// `LC_ID_DYLIB` compatibility version
    pub compatibility_version: Option<PackedVersion>,
    /// Swift ABI version from the ObjC image info
    pub swift_version: Option<u32>,
    /// ObjC retain/release model
    pub objc_constraint: Option<ObjcConstraint>,
    /// Header flags
    pub flags: Option<TbdFlags>,
    /// Per-architecture UUIDs
    pub uuids: Vec<UuidInfo>,
    /// Symbols sorted by (meta type, category, name)
    pub symbols: Vec<SymbolInfo>,
    /// Metadata strings sorted by (category, value)
    pub metadata: Vec<MetadataInfo>,
    options: ParseOptions,
    capacity: usize,
}

/// Keeps the first value written to `slot`; a different later value is a conflict.
fn first_wins<T: PartialEq>(
    slot: &mut Option<T>,
    value: T,
    kind: ConflictKind,
    policy: &mut dyn ConflictPolicy,
    arch: &'static ArchInfo,
) -> Result<()> {
    match slot {
        None => {
            *slot = Some(value);
            Ok(())
        }
        Some(existing) if *existing == value => Ok(()),
        Some(_) => resolve(policy, kind, arch),
    }
}

impl CreateInfo {
    /// Creates an empty description for a file with `capacity` architectures.
    pub fn new(version: TbdVersion, options: ParseOptions, capacity: usize) -> Self {
        Self {
            version,
            targets: TargetList::new(),
            platforms: Vec::new(),
            install_name: None,
            current_version: None,
            compatibility_version: None,
            swift_version: None,
            objc_constraint: None,
            flags: None,
            uuids: Vec::new(),
            symbols: Vec::new(),
            metadata: Vec::new(),
            options,
            capacity,
        }
    }

    /// Number of architectures each target bit list can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if at least one exported symbol was recorded.
    pub fn has_exports(&self) -> bool {
        self.symbols.iter().any(|s| s.meta == MetaType::Export)
    }

    fn new_targets(&self, index: usize) -> Result<BitList> {
        let mut targets = BitList::new(self.capacity.max(index + 1))?;
        if self.options.contains(ParseOptions::IGNORE_TARGETS) {
            targets.set_first_n(self.capacity);
        } else {
            targets.set_bit(index);
        }
        Ok(targets)
    }

    /// Platform used for new targets.
    #[inline]
    pub fn primary_platform(&self) -> Platform {
        self.platforms.first().copied().unwrap_or(Platform::MacOs)
    }

    // -------------------------------------------------------------------------
    // Architectures
    // -------------------------------------------------------------------------

    /// Records the platforms of one architecture.
    ///
    /// The first non-empty list wins; a different later list is a
    /// [`ConflictKind::Platform`] conflict.
    pub fn set_platforms(
        &mut self,
        platforms: &[Platform],
        policy: &mut dyn ConflictPolicy,
        arch: &'static ArchInfo,
    ) -> Result<()> {
        if platforms.is_empty() {
            return Ok(());
        }
        if self.platforms.is_empty() {
            self.platforms.try_reserve(platforms.len())?;
            self.platforms.extend_from_slice(platforms);
            return Ok(());
        }
        if self.platforms != platforms {
            resolve(policy, ConflictKind::Platform, arch)?;
        }
        Ok(())
    }

    /// Adds a target for `arch` and returns its bit index.
    ///
    /// Returns `None` when the architecture was already added and the policy
    /// chose to skip the duplicate.
    pub fn add_architecture(
        &mut self,
        arch: &'static ArchInfo,
        policy: &mut dyn ConflictPolicy,
    ) -> Result<Option<usize>> {
        let target = Target::new(arch, self.primary_platform());
        if self.targets.has_target(target) {
            resolve(policy, ConflictKind::DuplicateArchitecture, arch)?;
            return Ok(None);
        }

        self.targets.add_target(target)?;
        Ok(Some(self.targets.len() - 1))
    }

    /// Records the UUID of the architecture at `index`.
    ///
    /// A UUID already used by another architecture is a
    /// [`ConflictKind::NonUniqueUuid`] conflict; if tolerated it is still recorded.
    pub fn add_uuid(
        &mut self,
        index: usize,
        uuid: [u8; 16],
        policy: &mut dyn ConflictPolicy,
    ) -> Result<()> {
        let Some(target) = self.targets.get_target(index) else {
            return Ok(());
        };
        if self
            .uuids
            .iter()
            .any(|u| u.uuid == uuid && u.target != target)
        {
            resolve(policy, ConflictKind::NonUniqueUuid, target.arch())?;
        }

        self.uuids.try_reserve(1)?;
        self.uuids.push(UuidInfo { target, uuid });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Scalar fields
    // -------------------------------------------------------------------------

    /// Records the install name.
    pub fn set_install_name(
        &mut self,
        name: &[u8],
        policy: &mut dyn ConflictPolicy,
        arch: &'static ArchInfo,
    ) -> Result<()> {
        first_wins(
            &mut self.install_name,
            name.to_vec(),
            ConflictKind::InstallName,
            policy,
            arch,
        )
    }

    /// Records the current version.
    pub fn set_current_version(
        &mut self,
        version: u32,
        policy: &mut dyn ConflictPolicy,
        arch: &'static ArchInfo,
    ) -> Result<()> {
        first_wins(
            &mut self.current_version,
            PackedVersion(version),
            ConflictKind::CurrentVersion,
            policy,
            arch,
        )
    }

    /// Records the compatibility version.
    pub fn set_compatibility_version(
        &mut self,
        version: u32,
        policy: &mut dyn ConflictPolicy,
        arch: &'static ArchInfo,
    ) -> Result<()> {
        first_wins(
            &mut self.compatibility_version,
            PackedVersion(version),
            ConflictKind::CompatibilityVersion,
            policy,
            arch,
        )
    }

    /// Records the Swift ABI version.
    pub fn set_swift_version(
        &mut self,
        version: u32,
        policy: &mut dyn ConflictPolicy,
        arch: &'static ArchInfo,
    ) -> Result<()> {
        first_wins(&mut self.swift_version, version, ConflictKind::SwiftVersion, policy, arch)
    }

    /// Records the ObjC constraint.
    pub fn set_objc_constraint(
        &mut self,
        constraint: ObjcConstraint,
        policy: &mut dyn ConflictPolicy,
        arch: &'static ArchInfo,
    ) -> Result<()> {
        first_wins(
            &mut self.objc_constraint,
            constraint,
            ConflictKind::ObjcConstraint,
            policy,
            arch,
        )
    }

    /// Records the header flags.
    pub fn set_flags(
        &mut self,
        flags: TbdFlags,
        policy: &mut dyn ConflictPolicy,
        arch: &'static ArchInfo,
    ) -> Result<()> {
        first_wins(&mut self.flags, flags, ConflictKind::Flags, policy, arch)
    }

    // -------------------------------------------------------------------------
    // Symbols and metadata
    // -------------------------------------------------------------------------

    /// Records that `name` was seen in the architecture at `index`.
    ///
    /// An entry with the same meta type, category and name gains a bit;
    /// otherwise a new entry is inserted at its sorted position.
    pub fn add_symbol(
        &mut self,
        name: &[u8],
        kind: SymbolType,
        meta: MetaType,
        index: usize,
    ) -> Result<()> {
        match self
            .symbols
            .binary_search_by(|s| s.key_cmp(meta, kind, name))
        {
            Ok(found) => {
                self.symbols[found].targets.set_bit(index);
            }
            Err(insert_at) => {
                let targets = self.new_targets(index)?;
                self.symbols.try_reserve(1)?;
                self.symbols.insert(
                    insert_at,
                    SymbolInfo {
                        name: name.to_vec(),
                        kind,
                        meta,
                        targets,
                    },
                );
            }
        }
        Ok(())
    }

    /// Records a metadata string for the architecture at `index`.
    pub fn add_metadata(&mut self, value: &[u8], kind: MetadataKind, index: usize) -> Result<()> {
        match self.metadata.binary_search_by(|m| {
            m.kind
                .cmp(&kind)
                .then_with(|| m.value.as_slice().cmp(value))
        }) {
            Ok(found) => {
                self.metadata[found].targets.set_bit(index);
            }
            Err(insert_at) => {
                let targets = self.new_targets(index)?;
                self.metadata.try_reserve(1)?;
                self.metadata.insert(
                    insert_at,
                    MetadataInfo {
                        value: value.to_vec(),
                        kind,
                        targets,
                    },
                );
            }
        }
        Ok(())
    }

    /// Records the parent umbrella of the architecture at `index`.
    ///
    /// A library has at most one umbrella; a different name from a later
    /// architecture is a [`ConflictKind::ParentUmbrella`] conflict and is
    /// dropped if tolerated.
    pub fn add_parent_umbrella(
        &mut self,
        value: &[u8],
        index: usize,
        policy: &mut dyn ConflictPolicy,
        arch: &'static ArchInfo,
    ) -> Result<()> {
        let conflicting = self
            .metadata_of(MetadataKind::ParentUmbrella)
            .any(|m| m.value != value);
        if conflicting {
            return resolve(policy, ConflictKind::ParentUmbrella, arch);
        }
        self.add_metadata(value, MetadataKind::ParentUmbrella, index)
    }

    /// Iterates over metadata strings of one category.
    pub fn metadata_of(&self, kind: MetadataKind) -> impl Iterator<Item = &MetadataInfo> + '_ {
        self.metadata.iter().filter(move |m| m.kind == kind)
    }

    /// Looks up a symbol.
    pub fn find_symbol<N: AsRef<[u8]>>(
        &self,
        name: N,
        kind: SymbolType,
        meta: MetaType,
    ) -> Option<&SymbolInfo> {
        let name = name.as_ref();
        self.symbols
            .binary_search_by(|s| s.key_cmp(meta, kind, name))
            .ok()
            .map(|found| &self.symbols[found])
    }
}
