//! Mach-O constants and flags.

use bitflags::bitflags;

// =============================================================================
// Magic Numbers
// =============================================================================

/// 64-bit Mach-O magic (host order)
pub const MH_MAGIC_64: u32 = 0xFEEDFACF;

/// 64-bit Mach-O magic (byte-swapped)
pub const MH_CIGAM_64: u32 = 0xCFFAEDFE;

/// 32-bit Mach-O magic (host order)
pub const MH_MAGIC: u32 = 0xFEEDFACE;

/// 32-bit Mach-O magic (byte-swapped)
pub const MH_CIGAM: u32 = 0xCEFAEDFE;

/// FAT binary magic
pub const FAT_MAGIC: u32 = 0xCAFEBABE;

/// FAT binary magic (byte-swapped)
pub const FAT_CIGAM: u32 = 0xBEBAFECA;

/// 64-bit FAT binary magic
pub const FAT_MAGIC_64: u32 = 0xCAFEBABF;

/// 64-bit FAT binary magic (byte-swapped)
pub const FAT_CIGAM_64: u32 = 0xBFBAFECA;

// =============================================================================
// File Types
// =============================================================================

/// Object file
pub const MH_OBJECT: u32 = 0x1;
/// Executable
pub const MH_EXECUTE: u32 = 0x2;
/// Dynamically bound shared library
pub const MH_DYLIB: u32 = 0x6;
/// Bundle
pub const MH_BUNDLE: u32 = 0x8;
/// Shared library stub
pub const MH_DYLIB_STUB: u32 = 0x9;
/// Kernel extension bundle
pub const MH_KEXT_BUNDLE: u32 = 0xB;

// =============================================================================
// CPU Types
// =============================================================================

/// 64-bit architecture flag
pub const CPU_ARCH_ABI64: u32 = 0x0100_0000;
/// ILP32 on a 64-bit architecture
pub const CPU_ARCH_ABI64_32: u32 = 0x0200_0000;

/// Capability bits in the cpu subtype
pub const CPU_SUBTYPE_MASK: u32 = 0xFF00_0000;

/// x86 CPU type
pub const CPU_TYPE_X86: u32 = 7;
/// x86_64 CPU type
pub const CPU_TYPE_X86_64: u32 = CPU_TYPE_X86 | CPU_ARCH_ABI64;
/// ARM CPU type
pub const CPU_TYPE_ARM: u32 = 12;
/// ARM64 CPU type
pub const CPU_TYPE_ARM64: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64;
/// ARM64 with 32-bit pointers
pub const CPU_TYPE_ARM64_32: u32 = CPU_TYPE_ARM | CPU_ARCH_ABI64_32;
/// PowerPC CPU type
pub const CPU_TYPE_POWERPC: u32 = 18;
/// 64-bit PowerPC CPU type
pub const CPU_TYPE_POWERPC64: u32 = CPU_TYPE_POWERPC | CPU_ARCH_ABI64;

// =============================================================================
// Load Commands
// =============================================================================

/// Load command requiring dynamic linker
pub const LC_REQ_DYLD: u32 = 0x8000_0000;

/// Segment of this file
pub const LC_SEGMENT: u32 = 0x1;
/// Link-edit symbol table info
pub const LC_SYMTAB: u32 = 0x2;
/// Dynamically linked shared lib identification
pub const LC_ID_DYLIB: u32 = 0xD;
/// Sub framework
pub const LC_SUB_FRAMEWORK: u32 = 0x12;
/// Sub client
pub const LC_SUB_CLIENT: u32 = 0x14;
/// 64-bit segment
pub const LC_SEGMENT_64: u32 = 0x19;
/// UUID
pub const LC_UUID: u32 = 0x1B;
/// Load and re-export dylib
pub const LC_REEXPORT_DYLIB: u32 = 0x1F | LC_REQ_DYLD;
/// Compressed dyld info
pub const LC_DYLD_INFO: u32 = 0x22;
/// Compressed dyld info only
pub const LC_DYLD_INFO_ONLY: u32 = 0x22 | LC_REQ_DYLD;
/// Build for macOS min version
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
/// Build for iOS min version
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
/// Build for tvOS min version
pub const LC_VERSION_MIN_TVOS: u32 = 0x2F;
/// Build for watchOS min version
pub const LC_VERSION_MIN_WATCHOS: u32 = 0x30;
/// Build for platform min version
pub const LC_BUILD_VERSION: u32 = 0x32;
/// Used with linkedit_data_command, payload is trie
pub const LC_DYLD_EXPORTS_TRIE: u32 = 0x33 | LC_REQ_DYLD;

// =============================================================================
// Platforms
// =============================================================================

/// macOS
pub const PLATFORM_MACOS: u32 = 1;
/// iOS
pub const PLATFORM_IOS: u32 = 2;
/// tvOS
pub const PLATFORM_TVOS: u32 = 3;
/// watchOS
pub const PLATFORM_WATCHOS: u32 = 4;
/// Mac Catalyst
pub const PLATFORM_MACCATALYST: u32 = 6;

// =============================================================================
// Symbol Types
// =============================================================================

/// If any of these bits set, a symbolic debugging entry
pub const N_STAB: u8 = 0xE0;
/// Private external symbol bit
pub const N_PEXT: u8 = 0x10;
/// Mask for the type bits
pub const N_TYPE: u8 = 0x0E;
/// External symbol bit
pub const N_EXT: u8 = 0x01;

/// Undefined symbol
pub const N_UNDF: u8 = 0x0;
/// Absolute symbol
pub const N_ABS: u8 = 0x2;
/// Defined in section number n_sect
pub const N_SECT: u8 = 0xE;
/// Prebound undefined
pub const N_PBUD: u8 = 0xC;
/// Indirect
pub const N_INDR: u8 = 0xA;

/// Undefined symbol is a weak reference (`n_desc`)
pub const N_WEAK_REF: u16 = 0x0040;
/// Symbol is a weak definition (`n_desc`)
pub const N_WEAK_DEF: u16 = 0x0080;

// =============================================================================
// Export Flags
// =============================================================================

/// Export symbol kind mask.
pub const EXPORT_SYMBOL_FLAGS_KIND_MASK: u64 = 0x03;
/// Regular export.
pub const EXPORT_SYMBOL_FLAGS_KIND_REGULAR: u64 = 0x00;
/// Thread-local variable.
pub const EXPORT_SYMBOL_FLAGS_KIND_THREAD_LOCAL: u64 = 0x01;
/// Absolute symbol (not relative to any section).
pub const EXPORT_SYMBOL_FLAGS_KIND_ABSOLUTE: u64 = 0x02;
/// Weak definition.
pub const EXPORT_SYMBOL_FLAGS_WEAK_DEFINITION: u64 = 0x04;
/// Re-export from another dylib.
pub const EXPORT_SYMBOL_FLAGS_REEXPORT: u64 = 0x08;
/// Stub and resolver.
pub const EXPORT_SYMBOL_FLAGS_STUB_AND_RESOLVER: u64 = 0x10;

// =============================================================================
// ObjC Image Info
// =============================================================================

/// Image built for the simulator
pub const OBJC_IMAGE_IS_SIMULATED: u32 = 1 << 0;
/// Image supports garbage collection
pub const OBJC_IMAGE_SUPPORTS_GC: u32 = 1 << 1;
/// Image requires garbage collection
pub const OBJC_IMAGE_REQUIRES_GC: u32 = 1 << 2;
/// Shift of the swift version byte in the image-info flags
pub const OBJC_IMAGE_SWIFT_VERSION_SHIFT: u32 = 8;
/// Mask of the swift version byte after shifting
pub const OBJC_IMAGE_SWIFT_VERSION_MASK: u32 = 0xFF;

// =============================================================================
// Header Flags
// =============================================================================

bitflags! {
    /// Mach-O header flags that matter to stub generation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MachOFlags: u32 {
        /// The image is using two-level name space bindings
        const TWOLEVEL = 0x80;
        /// The final linked image contains external weak symbols
        const WEAK_DEFINES = 0x8000;
        /// The code was linked for use in an application extension
        const APP_EXTENSION_SAFE = 0x2000000;

        const _ = !0;
    }
}
