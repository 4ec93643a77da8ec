//! Architecture and platform identity.
//!
//! A [`Target`] pairs an entry of the static architecture table with a
//! [`Platform`]. Targets are the unit in which symbol membership is recorded:
//! bit `i` of a symbol's `BitList` refers to the `i`-th entry of the file's
//! [`TargetList`].

use std::fmt;
use std::str::FromStr;

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::macho::{
    CPU_SUBTYPE_MASK, CPU_TYPE_ARM, CPU_TYPE_ARM64, CPU_TYPE_ARM64_32, CPU_TYPE_POWERPC,
    CPU_TYPE_POWERPC64, CPU_TYPE_X86, CPU_TYPE_X86_64,
};

// =============================================================================
// Architecture Table
// =============================================================================

/// One row of the architecture table.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ArchInfo {
    /// Name as written in stub files
    pub name: &'static str,
    /// Mach-O cpu type
    pub cputype: u32,
    /// Mach-O cpu subtype, capability bits masked off
    pub cpusubtype: u32,
}

macro_rules! arch {
    ($name:literal, $cputype:expr, $subtype:literal) => {
        ArchInfo {
            name: $name,
            cputype: $cputype,
            cpusubtype: $subtype,
        }
    };
}

/// Every architecture the parser recognizes, in canonical table order.
///
/// Order matters: `ORDER_BY_ARCHITECTURE_TABLE` sorts output by row index.
pub static ARCH_TABLE: &[ArchInfo] = &[
    arch!("i386", CPU_TYPE_X86, 3),
    arch!("i486", CPU_TYPE_X86, 4),
    arch!("i486sx", CPU_TYPE_X86, 0x84),
    arch!("pentium", CPU_TYPE_X86, 5),
    arch!("pentpro", CPU_TYPE_X86, 0x16),
    arch!("pentIIm3", CPU_TYPE_X86, 0x36),
    arch!("pentIIm5", CPU_TYPE_X86, 0x56),
    arch!("pentium4", CPU_TYPE_X86, 0x0a),
    arch!("x86_64", CPU_TYPE_X86_64, 3),
    arch!("x86_64h", CPU_TYPE_X86_64, 8),
    arch!("arm", CPU_TYPE_ARM, 0),
    arch!("armv4t", CPU_TYPE_ARM, 5),
    arch!("armv6", CPU_TYPE_ARM, 6),
    arch!("armv5", CPU_TYPE_ARM, 7),
    arch!("xscale", CPU_TYPE_ARM, 8),
    arch!("armv7", CPU_TYPE_ARM, 9),
    arch!("armv7f", CPU_TYPE_ARM, 10),
    arch!("armv7s", CPU_TYPE_ARM, 11),
    arch!("armv7k", CPU_TYPE_ARM, 12),
    arch!("armv8", CPU_TYPE_ARM, 13),
    arch!("armv6m", CPU_TYPE_ARM, 14),
    arch!("armv7m", CPU_TYPE_ARM, 15),
    arch!("armv7em", CPU_TYPE_ARM, 16),
    arch!("arm64", CPU_TYPE_ARM64, 0),
    arch!("arm64v8", CPU_TYPE_ARM64, 1),
    arch!("arm64e", CPU_TYPE_ARM64, 2),
    arch!("arm64_32", CPU_TYPE_ARM64_32, 1),
    arch!("ppc", CPU_TYPE_POWERPC, 0),
    arch!("ppc601", CPU_TYPE_POWERPC, 1),
    arch!("ppc603", CPU_TYPE_POWERPC, 3),
    arch!("ppc603e", CPU_TYPE_POWERPC, 4),
    arch!("ppc603ev", CPU_TYPE_POWERPC, 5),
    arch!("ppc604", CPU_TYPE_POWERPC, 6),
    arch!("ppc604e", CPU_TYPE_POWERPC, 7),
    arch!("ppc750", CPU_TYPE_POWERPC, 9),
    arch!("ppc7400", CPU_TYPE_POWERPC, 10),
    arch!("ppc7450", CPU_TYPE_POWERPC, 11),
    arch!("ppc970", CPU_TYPE_POWERPC, 100),
    arch!("ppc64", CPU_TYPE_POWERPC64, 0),
    arch!("ppc970-64", CPU_TYPE_POWERPC64, 100),
];

impl ArchInfo {
    /// Looks up an architecture by cpu type and subtype.
    ///
    /// Capability bits in the high byte of the subtype are ignored.
    pub fn lookup(cputype: u32, cpusubtype: u32) -> Option<&'static ArchInfo> {
        let cpusubtype = cpusubtype & !CPU_SUBTYPE_MASK;
        ARCH_TABLE
            .iter()
            .find(|a| a.cputype == cputype && a.cpusubtype == cpusubtype)
    }

    /// Looks up an architecture by its stub-file name.
    pub fn by_name(name: &str) -> Option<&'static ArchInfo> {
        ARCH_TABLE.iter().find(|a| a.name == name)
    }

    /// Returns this architecture's row in [`ARCH_TABLE`].
    pub fn index(&'static self) -> usize {
        ARCH_TABLE
            .iter()
            .position(|a| std::ptr::eq(a, self))
            .unwrap_or(ARCH_TABLE.len())
    }
}

// =============================================================================
// Platform
// =============================================================================

/// Operating-system platform from `LC_BUILD_VERSION` or `LC_VERSION_MIN_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
#[allow(missing_docs)] // Variants are self-documenting via names
pub enum Platform {
    MacOs = 1,
    IOs = 2,
    TvOs = 3,
    WatchOs = 4,
    BridgeOs = 5,
    MacCatalyst = 6,
    IOsSimulator = 7,
    TvOsSimulator = 8,
    WatchOsSimulator = 9,
    DriverKit = 10,
}

impl Platform {
    /// All platforms in numeric order.
    pub const ALL: [Platform; 10] = [
        Platform::MacOs,
        Platform::IOs,
        Platform::TvOs,
        Platform::WatchOs,
        Platform::BridgeOs,
        Platform::MacCatalyst,
        Platform::IOsSimulator,
        Platform::TvOsSimulator,
        Platform::WatchOsSimulator,
        Platform::DriverKit,
    ];

    /// Converts a raw `LC_BUILD_VERSION` platform value.
    pub fn from_raw(raw: u32) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| *p as u32 == raw)
            .ok_or(Error::InvalidPlatform(raw))
    }

    /// Name used by the v1-v3 `platform:` line.
    pub fn legacy_name(self) -> &'static str {
        match self {
            Platform::MacOs => "macosx",
            Platform::IOs | Platform::IOsSimulator => "ios",
            Platform::TvOs | Platform::TvOsSimulator => "tvos",
            Platform::WatchOs | Platform::WatchOsSimulator => "watchos",
            Platform::BridgeOs => "bridgeos",
            Platform::MacCatalyst => "iosmac",
            Platform::DriverKit => "driverkit",
        }
    }

    /// Suffix used by v4 target strings (`x86_64-macos`).
    pub fn target_name(self) -> &'static str {
        match self {
            Platform::MacOs => "macos",
            Platform::IOs => "ios",
            Platform::TvOs => "tvos",
            Platform::WatchOs => "watchos",
            Platform::BridgeOs => "bridgeos",
            Platform::MacCatalyst => "maccatalyst",
            Platform::IOsSimulator => "ios-simulator",
            Platform::TvOsSimulator => "tvos-simulator",
            Platform::WatchOsSimulator => "watchos-simulator",
            Platform::DriverKit => "driverkit",
        }
    }

    /// Returns true if `a` and `b` form the macOS/Catalyst "zippered" pair.
    pub fn is_zippered_pair(a: Platform, b: Platform) -> bool {
        matches!(
            (a, b),
            (Platform::MacOs, Platform::MacCatalyst) | (Platform::MacCatalyst, Platform::MacOs)
        )
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.target_name())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.target_name() == s || p.legacy_name() == s)
            .ok_or(Error::InvalidPlatform(0))
    }
}

// =============================================================================
// Target
// =============================================================================

const PLATFORM_BITS: u32 = 4;
const PLATFORM_MASK: u64 = (1 << PLATFORM_BITS) - 1;

/// An (architecture, platform) pair packed into one word.
///
/// The architecture's table index occupies the high bits, the platform the
/// low four bits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target(u64);

impl Target {
    /// Creates a target from an architecture and a platform.
    pub fn new(arch: &'static ArchInfo, platform: Platform) -> Self {
        Self(((arch.index() as u64) << PLATFORM_BITS) | platform as u64)
    }

    /// Returns the architecture.
    pub fn arch(self) -> &'static ArchInfo {
        &ARCH_TABLE[(self.0 >> PLATFORM_BITS) as usize]
    }

    /// Returns the platform.
    pub fn platform(self) -> Platform {
        let raw = (self.0 & PLATFORM_MASK) as u32;
        Platform::from_raw(raw).unwrap_or(Platform::MacOs)
    }

    /// Returns a copy with the platform replaced.
    pub fn with_platform(self, platform: Platform) -> Self {
        Self((self.0 & !PLATFORM_MASK) | platform as u64)
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target({self})")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch().name, self.platform().target_name())
    }
}

// =============================================================================
// Target List
// =============================================================================

/// Number of targets stored without a heap allocation.
pub const INLINE_TARGETS: usize = 3;

/// Ordered list of targets.
///
/// The list does not deduplicate: callers check [`TargetList::has_target`]
/// before [`TargetList::add_target`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    items: SmallVec<[Target; INLINE_TARGETS]>,
}

impl TargetList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a target. Provided for symmetry with the list operations.
    #[inline]
    pub fn create_target(arch: &'static ArchInfo, platform: Platform) -> Target {
        Target::new(arch, platform)
    }

    /// Returns the stored targets in insertion order.
    #[inline]
    pub fn as_slice(&self) -> &[Target] {
        &self.items
    }

    /// Returns the number of targets.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns true if the targets live on the heap.
    #[inline]
    pub fn is_on_heap(&self) -> bool {
        self.items.spilled()
    }

    /// Returns the target at `index`.
    #[inline]
    pub fn get_target(&self, index: usize) -> Option<Target> {
        self.items.get(index).copied()
    }

    /// Returns true if `target` is already present.
    #[inline]
    pub fn has_target(&self, target: Target) -> bool {
        self.items.contains(&target)
    }

    /// Returns the index of `target`, if present.
    #[inline]
    pub fn position(&self, target: Target) -> Option<usize> {
        self.items.iter().position(|t| *t == target)
    }

    /// Returns true if any target uses `arch`, regardless of platform.
    pub fn has_arch(&self, arch: &'static ArchInfo) -> bool {
        self.items.iter().any(|t| std::ptr::eq(t.arch(), arch))
    }

    /// Iterates over the targets in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Target> + '_ {
        self.items.iter().copied()
    }

    /// Appends a target.
    ///
    /// Duplicates are not rejected; see the type documentation. A full
    /// buffer doubles, spilling to the heap on the fourth insert.
    pub fn add_target(&mut self, target: Target) -> Result<()> {
        if self.items.len() == self.items.capacity() {
            self.items
                .try_reserve(1)
                .map_err(|_| Error::OutOfMemory {
                    requested: self.items.len() + 1,
                })?;
        }
        self.items.push(target);
        Ok(())
    }

    /// Ensures room for `count` targets in total.
    pub fn reserve(&mut self, count: usize) -> Result<()> {
        let additional = count.saturating_sub(self.items.len());
        self.items
            .try_reserve_exact(additional)
            .map_err(|_| Error::OutOfMemory { requested: count })
    }

    /// Rewrites the platform of every stored target.
    pub fn replace_platform(&mut self, platform: Platform) {
        for target in self.items.iter_mut() {
            *target = target.with_platform(platform);
        }
    }

    /// Returns the distinct platforms in first-seen order.
    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms = Vec::new();
        for target in self.iter() {
            if !platforms.contains(&target.platform()) {
                platforms.push(target.platform());
            }
        }
        platforms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arch(name: &str) -> &'static ArchInfo {
        ArchInfo::by_name(name).unwrap()
    }

    #[test]
    fn test_arch_lookup() {
        assert_eq!(ArchInfo::lookup(CPU_TYPE_X86_64, 3).unwrap().name, "x86_64");
        assert_eq!(ArchInfo::lookup(CPU_TYPE_X86_64, 0x8000_0003).unwrap().name, "x86_64");
        assert_eq!(ArchInfo::lookup(CPU_TYPE_ARM64, 0x8000_0002).unwrap().name, "arm64e");
        assert_eq!(ArchInfo::lookup(CPU_TYPE_ARM, 11).unwrap().name, "armv7s");
        assert!(ArchInfo::lookup(0x1234, 0).is_none());
    }

    #[test]
    fn test_target_packing() {
        let target = Target::new(arch("arm64e"), Platform::IOsSimulator);
        assert_eq!(target.arch().name, "arm64e");
        assert_eq!(target.platform(), Platform::IOsSimulator);
        assert_eq!(target.to_string(), "arm64e-ios-simulator");

        let moved = target.with_platform(Platform::TvOs);
        assert_eq!(moved.arch().name, "arm64e");
        assert_eq!(moved.platform(), Platform::TvOs);
    }

    #[test]
    fn test_caller_checks_duplicates() {
        let mut list = TargetList::new();
        let target = Target::new(arch("x86_64"), Platform::MacOs);

        for _ in 0..2 {
            if !list.has_target(target) {
                list.add_target(target).unwrap();
            }
        }
        assert_eq!(list.len(), 1);

        // The structure itself accepts the duplicate.
        list.add_target(target).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_promotion_on_fourth_insert() {
        let mut list = TargetList::new();
        let names = ["i386", "x86_64", "armv7", "arm64", "arm64e"];
        for (i, name) in names.iter().enumerate() {
            list.add_target(Target::new(arch(name), Platform::IOs)).unwrap();
            assert_eq!(list.is_on_heap(), i >= INLINE_TARGETS, "after {} inserts", i + 1);
        }

        let stored: Vec<_> = list.iter().map(|t| t.arch().name).collect();
        assert_eq!(stored, names);
        assert_eq!(list.get_target(2).unwrap().arch().name, "armv7");
        assert!(list.get_target(5).is_none());
    }

    #[test]
    fn test_reserve_promotes() {
        let mut list = TargetList::new();
        list.reserve(2).unwrap();
        assert!(!list.is_on_heap());
        list.add_target(Target::new(arch("arm64"), Platform::MacOs)).unwrap();
        list.reserve(8).unwrap();
        assert!(list.is_on_heap());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_replace_platform() {
        let mut list = TargetList::new();
        list.add_target(Target::new(arch("x86_64"), Platform::MacOs)).unwrap();
        list.add_target(Target::new(arch("arm64"), Platform::MacCatalyst)).unwrap();
        list.replace_platform(Platform::IOs);
        assert!(list.iter().all(|t| t.platform() == Platform::IOs));
        assert_eq!(list.platforms(), vec![Platform::IOs]);
    }

    #[test]
    fn test_platform_names() {
        assert_eq!(Platform::from_raw(6).unwrap(), Platform::MacCatalyst);
        assert!(Platform::from_raw(0).is_err());
        assert_eq!("macosx".parse::<Platform>().unwrap(), Platform::MacOs);
        assert!(Platform::is_zippered_pair(Platform::MacCatalyst, Platform::MacOs));
    }
}
