//! Mach-O binary structures.
//!
//! These structures match the on-disk format of Mach-O files. They are read
//! by copy in file byte order and converted with [`Swap::to_endian`].

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use super::constants::*;
use crate::cursor::Endian;

// =============================================================================
// Byte Swapping
// =============================================================================

/// Converts an on-disk structure between byte orders.
pub trait Swap: Sized {
    /// Reverses the byte order of every multi-byte integer field.
    fn swap(&mut self);

    /// Returns the value converted from `endian` to host order.
    #[inline]
    fn to_endian(mut self, endian: Endian) -> Self {
        if endian.needs_swap() {
            self.swap();
        }
        self
    }
}

macro_rules! impl_swap {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl Swap for $ty {
            #[inline]
            fn swap(&mut self) {
                $( self.$field = self.$field.swap_bytes(); )*
            }
        }
    };
}

/// Returns a fixed-size, NUL-padded name without its padding.
#[inline]
pub fn fixed_name(name: &[u8; 16]) -> &[u8] {
    let end = name.iter().position(|&b| b == 0).unwrap_or(16);
    &name[..end]
}

// =============================================================================
// Fat Header Structures
// =============================================================================

/// Universal binary header. Always big-endian on disk.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatHeader {
    /// FAT_MAGIC or FAT_MAGIC_64
    pub magic: u32,
    /// Number of fat_arch entries that follow
    pub nfat_arch: u32,
}

impl FatHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 8;
}

impl_swap!(FatHeader { magic, nfat_arch });

/// 32-bit universal binary architecture entry.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch {
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File offset of the slice
    pub offset: u32,
    /// Size of the slice
    pub size: u32,
    /// Alignment as a power of 2
    pub align: u32,
}

impl FatArch {
    /// Size of an entry in bytes.
    pub const SIZE: usize = 20;
}

impl_swap!(FatArch { cputype, cpusubtype, offset, size, align });

/// 64-bit universal binary architecture entry.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FatArch64 {
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File offset of the slice
    pub offset: u64,
    /// Size of the slice
    pub size: u64,
    /// Alignment as a power of 2
    pub align: u32,
    /// Reserved
    pub reserved: u32,
}

impl FatArch64 {
    /// Size of an entry in bytes.
    pub const SIZE: usize = 32;
}

impl_swap!(FatArch64 { cputype, cpusubtype, offset, size, align, reserved });

// =============================================================================
// Header Structures
// =============================================================================

/// 32-bit Mach-O header.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader {
    /// Magic number (MH_MAGIC)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
}

impl MachHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 28;
}

impl_swap!(MachHeader { magic, cputype, cpusubtype, filetype, ncmds, sizeofcmds, flags });

/// 64-bit Mach-O header.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct MachHeader64 {
    /// Magic number (MH_MAGIC_64)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
    /// Reserved
    pub reserved: u32,
}

impl MachHeader64 {
    /// Size of the header in bytes.
    pub const SIZE: usize = 32;

    /// Returns the header without its trailing reserved word.
    pub fn narrow(&self) -> MachHeader {
        MachHeader {
            magic: self.magic,
            cputype: self.cputype,
            cpusubtype: self.cpusubtype,
            filetype: self.filetype,
            ncmds: self.ncmds,
            sizeofcmds: self.sizeofcmds,
            flags: self.flags,
        }
    }
}

impl_swap!(MachHeader64 { magic, cputype, cpusubtype, filetype, ncmds, sizeofcmds, flags, reserved });

// =============================================================================
// Load Command Header
// =============================================================================

/// Generic load command header.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LoadCommand {
    /// Type of load command
    pub cmd: u32,
    /// Size of load command
    pub cmdsize: u32,
}

impl LoadCommand {
    /// Size of the load command header.
    pub const SIZE: usize = 8;
}

impl_swap!(LoadCommand { cmd, cmdsize });

// =============================================================================
// Segment Commands
// =============================================================================

/// 32-bit segment command.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand {
    /// LC_SEGMENT
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: u32,
    /// Virtual memory size
    pub vmsize: u32,
    /// File offset
    pub fileoff: u32,
    /// Amount of file to map
    pub filesize: u32,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
    /// Number of sections
    pub nsects: u32,
    /// Flags
    pub flags: u32,
}

impl SegmentCommand {
    /// Size of the segment command (without sections).
    pub const SIZE: usize = 56;
}

impl_swap!(SegmentCommand {
    cmd, cmdsize, vmaddr, vmsize, fileoff, filesize, maxprot, initprot, nsects, flags
});

/// 64-bit segment command.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SegmentCommand64 {
    /// LC_SEGMENT_64
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub vmaddr: u64,
    /// Virtual memory size
    pub vmsize: u64,
    /// File offset
    pub fileoff: u64,
    /// Amount of file to map
    pub filesize: u64,
    /// Maximum VM protection
    pub maxprot: u32,
    /// Initial VM protection
    pub initprot: u32,
    /// Number of sections
    pub nsects: u32,
    /// Flags
    pub flags: u32,
}

impl SegmentCommand64 {
    /// Size of the segment command (without sections).
    pub const SIZE: usize = 72;
}

impl_swap!(SegmentCommand64 {
    cmd, cmdsize, vmaddr, vmsize, fileoff, filesize, maxprot, initprot, nsects, flags
});

/// 32-bit section.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section {
    /// Section name (16 bytes, null-padded)
    pub sectname: [u8; 16],
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: u32,
    /// Size in bytes
    pub size: u32,
    /// File offset
    pub offset: u32,
    /// Alignment (power of 2)
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Flags
    pub flags: u32,
    /// Reserved (for runtime use)
    pub reserved1: u32,
    /// Reserved (for runtime use)
    pub reserved2: u32,
}

impl Section {
    /// Size of a section entry.
    pub const SIZE: usize = 68;
}

impl_swap!(Section { addr, size, offset, align, reloff, nreloc, flags, reserved1, reserved2 });

/// 64-bit section.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Section64 {
    /// Section name (16 bytes, null-padded)
    pub sectname: [u8; 16],
    /// Segment name (16 bytes, null-padded)
    pub segname: [u8; 16],
    /// Virtual memory address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset
    pub offset: u32,
    /// Alignment (power of 2)
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Flags
    pub flags: u32,
    /// Reserved (for runtime use)
    pub reserved1: u32,
    /// Reserved (for runtime use)
    pub reserved2: u32,
    /// Reserved
    pub reserved3: u32,
}

impl Section64 {
    /// Size of a section entry.
    pub const SIZE: usize = 80;
}

impl_swap!(Section64 {
    addr, size, offset, align, reloff, nreloc, flags, reserved1, reserved2, reserved3
});

// =============================================================================
// Symbol Table Commands
// =============================================================================

/// Symbol table command.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SymtabCommand {
    /// LC_SYMTAB
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// Symbol table offset
    pub symoff: u32,
    /// Number of symbol table entries
    pub nsyms: u32,
    /// String table offset
    pub stroff: u32,
    /// String table size in bytes
    pub strsize: u32,
}

impl SymtabCommand {
    /// Size of this command.
    pub const SIZE: usize = 24;
}

impl_swap!(SymtabCommand { cmd, cmdsize, symoff, nsyms, stroff, strsize });

/// 32-bit symbol table entry.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Nlist {
    /// Index into string table
    pub n_strx: u32,
    /// Type flag
    pub n_type: u8,
    /// Section number or NO_SECT
    pub n_sect: u8,
    /// Flags (see <mach-o/stab.h>)
    pub n_desc: u16,
    /// Value
    pub n_value: u32,
}

impl Nlist {
    /// Size of an nlist entry.
    pub const SIZE: usize = 12;

    /// Widens the entry to the 64-bit layout.
    #[inline]
    pub fn widen(&self) -> Nlist64 {
        Nlist64 {
            n_strx: self.n_strx,
            n_type: self.n_type,
            n_sect: self.n_sect,
            n_desc: self.n_desc,
            n_value: self.n_value as u64,
        }
    }
}

impl_swap!(Nlist { n_strx, n_desc, n_value });

/// 64-bit symbol table entry.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Nlist64 {
    /// Index into string table
    pub n_strx: u32,
    /// Type flag
    pub n_type: u8,
    /// Section number or NO_SECT
    pub n_sect: u8,
    /// Flags (see <mach-o/stab.h>)
    pub n_desc: u16,
    /// Value
    pub n_value: u64,
}

impl Nlist64 {
    /// Size of an nlist entry.
    pub const SIZE: usize = 16;

    /// Returns true if this is an external symbol.
    #[inline]
    pub fn is_external(&self) -> bool {
        (self.n_type & N_EXT) != 0
    }

    /// Returns true if this is a private external symbol.
    #[inline]
    pub fn is_private_external(&self) -> bool {
        (self.n_type & N_PEXT) != 0
    }

    /// Returns the N_TYPE bits.
    #[inline]
    pub fn kind(&self) -> u8 {
        self.n_type & N_TYPE
    }

    /// Returns true if this is a debugging symbol.
    #[inline]
    pub fn is_debug(&self) -> bool {
        (self.n_type & N_STAB) != 0
    }
}

impl_swap!(Nlist64 { n_strx, n_desc, n_value });

// =============================================================================
// Dyld Info Commands
// =============================================================================

/// Dyld info command (compressed LINKEDIT information).
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DyldInfoCommand {
    /// LC_DYLD_INFO or LC_DYLD_INFO_ONLY
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// File offset to rebase info
    pub rebase_off: u32,
    /// Size of rebase info
    pub rebase_size: u32,
    /// File offset to binding info
    pub bind_off: u32,
    /// Size of binding info
    pub bind_size: u32,
    /// File offset to weak binding info
    pub weak_bind_off: u32,
    /// Size of weak binding info
    pub weak_bind_size: u32,
    /// File offset to lazy binding info
    pub lazy_bind_off: u32,
    /// Size of lazy binding info
    pub lazy_bind_size: u32,
    /// File offset to export info
    pub export_off: u32,
    /// Size of export info
    pub export_size: u32,
}

impl DyldInfoCommand {
    /// Size of this command.
    pub const SIZE: usize = 48;
}

impl_swap!(DyldInfoCommand {
    cmd, cmdsize, rebase_off, rebase_size, bind_off, bind_size, weak_bind_off,
    weak_bind_size, lazy_bind_off, lazy_bind_size, export_off, export_size
});

/// Generic linkedit data command.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct LinkeditDataCommand {
    /// Command type (LC_DYLD_EXPORTS_TRIE, etc.)
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// File offset
    pub dataoff: u32,
    /// Size
    pub datasize: u32,
}

impl LinkeditDataCommand {
    /// Size of this command.
    pub const SIZE: usize = 16;
}

impl_swap!(LinkeditDataCommand { cmd, cmdsize, dataoff, datasize });

// =============================================================================
// Dylib Commands
// =============================================================================

/// Dylib reference (shared by several load commands).
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct Dylib {
    /// Library's path name offset
    pub name_offset: u32,
    /// Library's build timestamp
    pub timestamp: u32,
    /// Library's current version number
    pub current_version: u32,
    /// Library's compatibility version number
    pub compatibility_version: u32,
}

impl_swap!(Dylib { name_offset, timestamp, current_version, compatibility_version });

/// Dylib load command.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct DylibCommand {
    /// LC_ID_DYLIB, LC_REEXPORT_DYLIB, etc.
    pub cmd: u32,
    /// Total size (includes path string)
    pub cmdsize: u32,
    /// Library identification
    pub dylib: Dylib,
}

impl DylibCommand {
    /// Minimum size of this command (without path string).
    pub const SIZE: usize = 24;
}

impl Swap for DylibCommand {
    fn swap(&mut self) {
        self.cmd = self.cmd.swap_bytes();
        self.cmdsize = self.cmdsize.swap_bytes();
        self.dylib.swap();
    }
}

/// Sub-client, sub-framework, sub-umbrella and sub-library commands.
///
/// All of them carry a single string located by `offset`.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct SubCommand {
    /// LC_SUB_CLIENT, LC_SUB_FRAMEWORK, ...
    pub cmd: u32,
    /// Total size (includes the string)
    pub cmdsize: u32,
    /// Offset of the string from the start of the command
    pub offset: u32,
}

impl SubCommand {
    /// Minimum size of this command (without the string).
    pub const SIZE: usize = 12;
}

impl_swap!(SubCommand { cmd, cmdsize, offset });

// =============================================================================
// Identification Commands
// =============================================================================

/// UUID command.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct UuidCommand {
    /// LC_UUID
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// UUID
    pub uuid: [u8; 16],
}

impl UuidCommand {
    /// Size of this command.
    pub const SIZE: usize = 24;
}

impl_swap!(UuidCommand { cmd, cmdsize });

/// Build version command.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct BuildVersionCommand {
    /// LC_BUILD_VERSION
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// Platform
    pub platform: u32,
    /// Minimum OS version (X.Y.Z packed into 32 bits)
    pub minos: u32,
    /// SDK version (X.Y.Z packed into 32 bits)
    pub sdk: u32,
    /// Number of tool entries following
    pub ntools: u32,
}

impl BuildVersionCommand {
    /// Size of this command (without tool entries).
    pub const SIZE: usize = 24;
}

impl_swap!(BuildVersionCommand { cmd, cmdsize, platform, minos, sdk, ntools });

/// Version-min command (LC_VERSION_MIN_MACOSX and friends).
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct VersionMinCommand {
    /// LC_VERSION_MIN_*
    pub cmd: u32,
    /// Size of this load command
    pub cmdsize: u32,
    /// Minimum OS version (X.Y.Z packed into 32 bits)
    pub version: u32,
    /// SDK version (X.Y.Z packed into 32 bits)
    pub sdk: u32,
}

impl VersionMinCommand {
    /// Size of this command.
    pub const SIZE: usize = 16;
}

impl_swap!(VersionMinCommand { cmd, cmdsize, version, sdk });

/// Contents of an `__objc_imageinfo` section.
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct ObjcImageInfo {
    /// Always zero
    pub version: u32,
    /// OBJC_IMAGE_* flags and the swift version byte
    pub flags: u32,
}

impl ObjcImageInfo {
    /// Size of the structure.
    pub const SIZE: usize = 8;
}

impl_swap!(ObjcImageInfo { version, flags });

// =============================================================================
// Display Implementations
// =============================================================================

impl fmt::Display for MachHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MachO {{ cpu: {:#x}/{:#x}, type: {:#x}, cmds: {}, flags: {:#x} }}",
            self.cputype, self.cpusubtype, self.filetype, self.ncmds, self.flags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_sizes() {
        assert_eq!(std::mem::size_of::<FatHeader>(), FatHeader::SIZE);
        assert_eq!(std::mem::size_of::<FatArch>(), FatArch::SIZE);
        assert_eq!(std::mem::size_of::<FatArch64>(), FatArch64::SIZE);
        assert_eq!(std::mem::size_of::<MachHeader>(), MachHeader::SIZE);
        assert_eq!(std::mem::size_of::<MachHeader64>(), MachHeader64::SIZE);
        assert_eq!(std::mem::size_of::<SegmentCommand>(), SegmentCommand::SIZE);
        assert_eq!(std::mem::size_of::<SegmentCommand64>(), SegmentCommand64::SIZE);
        assert_eq!(std::mem::size_of::<Section>(), Section::SIZE);
        assert_eq!(std::mem::size_of::<Section64>(), Section64::SIZE);
        assert_eq!(std::mem::size_of::<Nlist>(), Nlist::SIZE);
        assert_eq!(std::mem::size_of::<Nlist64>(), Nlist64::SIZE);
        assert_eq!(std::mem::size_of::<DylibCommand>(), DylibCommand::SIZE);
        assert_eq!(std::mem::size_of::<DyldInfoCommand>(), DyldInfoCommand::SIZE);
    }

    #[test]
    fn test_swap_round_trip() {
        let cmd = SymtabCommand {
            cmd: LC_SYMTAB,
            cmdsize: 24,
            symoff: 0x1000,
            nsyms: 3,
            stroff: 0x2000,
            strsize: 0x40,
        };
        let mut swapped = cmd;
        swapped.swap();
        assert_eq!(swapped.symoff, 0x0010_0000);
        swapped.swap();
        assert_eq!(swapped.symoff, cmd.symoff);
        assert_eq!(swapped.strsize, cmd.strsize);
    }

    #[test]
    fn test_fixed_name() {
        let mut name = [0u8; 16];
        name[..6].copy_from_slice(b"__DATA");
        assert_eq!(fixed_name(&name), b"__DATA");
        assert_eq!(fixed_name(&[b'x'; 16]).len(), 16);
    }
}
