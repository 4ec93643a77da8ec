//! Container layer: thin and fat Mach-O files.
//!
//! [`MachOFile::parse`] turns a byte region into a list of validated
//! architecture slices. Fat headers are always big-endian; each slice may be
//! either byte order. Every `fat_arch` range is checked to lie inside the
//! file, to not overlap the fat header or another slice, and to start with a
//! Mach-O header whose cpu type matches its table entry.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::debug;

use super::constants::*;
use super::structs::*;
use crate::cursor::{Cursor, Endian};
use crate::error::{Error, Result};
use crate::range::{checked_add, checked_mul, Range};
use crate::target::ArchInfo;

// =============================================================================
// Slice Header
// =============================================================================

/// A decoded Mach-O header in host byte order.
#[derive(Debug, Clone, Copy)]
pub struct SliceHeader {
    /// Byte order of the slice
    pub endian: Endian,
    /// True for MH_MAGIC_64 headers
    pub is_64: bool,
    /// Header fields (the 64-bit reserved word is dropped)
    pub header: MachHeader,
}

impl SliceHeader {
    /// Decodes the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::buffer_too_small(4, data.len() as u64));
        }

        let (endian, is_64) = match LittleEndian::read_u32(data) {
            MH_MAGIC => (Endian::Little, false),
            MH_MAGIC_64 => (Endian::Little, true),
            MH_CIGAM => (Endian::Big, false),
            MH_CIGAM_64 => (Endian::Big, true),
            other => return Err(Error::InvalidMagic(other)),
        };

        let mut cursor = Cursor::new(data, endian);
        let header = if is_64 {
            cursor.read_swapped::<MachHeader64>()?.narrow()
        } else {
            cursor.read_swapped::<MachHeader>()?
        };

        Ok(Self {
            endian,
            is_64,
            header,
        })
    }

    /// Size of the header in bytes; load commands start here.
    #[inline]
    pub fn size(&self) -> usize {
        if self.is_64 {
            MachHeader64::SIZE
        } else {
            MachHeader::SIZE
        }
    }

    /// Returns the header flags.
    #[inline]
    pub fn flags(&self) -> MachOFlags {
        MachOFlags::from_bits_retain(self.header.flags)
    }

    /// Returns true if the file type describes a dynamic library.
    #[inline]
    pub fn is_dylib(&self) -> bool {
        matches!(self.header.filetype, MH_DYLIB | MH_DYLIB_STUB)
    }
}

// =============================================================================
// Architecture Slice
// =============================================================================

/// One architecture's bytes within a file.
#[derive(Debug, Clone)]
pub struct Slice<'a> {
    /// Architecture table entry
    pub arch: &'static ArchInfo,
    /// Position of the slice in the file
    pub range: Range,
    /// Decoded Mach-O header
    pub header: SliceHeader,
    /// The slice bytes
    pub data: &'a [u8],
}

impl<'a> Slice<'a> {
    fn new(data: &'a [u8], range: Range) -> Result<Self> {
        let header = SliceHeader::parse(data)?;
        let arch = ArchInfo::lookup(header.header.cputype, header.header.cpusubtype).ok_or(
            Error::UnsupportedCpu {
                cputype: header.header.cputype,
                cpusubtype: header.header.cpusubtype,
            },
        )?;

        Ok(Self {
            arch,
            range,
            header,
            data,
        })
    }

    /// Returns a cursor over the slice in its own byte order.
    ///
    /// Error offsets are reported relative to the whole file.
    pub fn cursor(&self) -> Cursor<'a> {
        Cursor::new(self.data, self.header.endian).with_base(self.range.begin)
    }

    /// Returns the bytes covered by `range`, relative to the slice start.
    pub fn bytes(&self, range: Range) -> Option<&'a [u8]> {
        crate::range::slice_range(self.data, range)
    }

    /// Returns the slice extent relative to its own start.
    #[inline]
    pub fn local_range(&self) -> Range {
        Range {
            begin: 0,
            end: self.data.len() as u64,
        }
    }
}

// =============================================================================
// Mach-O File
// =============================================================================

/// Kind of container a file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    /// A single Mach-O image
    Thin,
    /// A universal binary with 32-bit offsets
    Fat,
    /// A universal binary with 64-bit offsets
    Fat64,
}

/// A parsed Mach-O container.
#[derive(Debug)]
pub struct MachOFile<'a> {
    /// Container kind
    pub container: Container,
    /// Architecture slices in file order
    pub slices: Vec<Slice<'a>>,
}

impl<'a> MachOFile<'a> {
    /// Parses the container layout of `data`.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::buffer_too_small(4, data.len() as u64));
        }

        let file = match BigEndian::read_u32(data) {
            FAT_MAGIC => Self::parse_fat(data, false)?,
            FAT_MAGIC_64 => Self::parse_fat(data, true)?,
            _ => {
                let range = Range {
                    begin: 0,
                    end: data.len() as u64,
                };
                Self {
                    container: Container::Thin,
                    slices: vec![Slice::new(data, range)?],
                }
            }
        };

        debug!(
            "Parsed {:?} container with {} architecture(s)",
            file.container,
            file.slices.len()
        );
        Ok(file)
    }

    fn parse_fat(data: &'a [u8], is_64: bool) -> Result<Self> {
        let mut cursor = Cursor::new(data, Endian::Big);
        let header: FatHeader = cursor.read_swapped()?;
        if header.nfat_arch == 0 {
            return Err(Error::NoArchitectures);
        }

        let entry_size = if is_64 { FatArch64::SIZE } else { FatArch::SIZE } as u64;
        let table_end = checked_mul(header.nfat_arch as u64, entry_size)
            .and_then(|size| checked_add(size, FatHeader::SIZE as u64))
            .filter(|&end| end <= data.len() as u64)
            .ok_or(Error::InvalidFatHeader {
                reason: "architecture table extends past end of file",
            })?;

        let file_range = Range {
            begin: table_end,
            end: data.len() as u64,
        };

        let mut slices: Vec<Slice<'a>> = Vec::new();
        slices.try_reserve_exact(header.nfat_arch as usize)?;

        for index in 0..header.nfat_arch as usize {
            let (cputype, cpusubtype, offset, size) = if is_64 {
                let arch: FatArch64 = cursor.read_swapped()?;
                (arch.cputype, arch.cpusubtype, arch.offset, arch.size)
            } else {
                let arch: FatArch = cursor.read_swapped()?;
                (arch.cputype, arch.cpusubtype, arch.offset as u64, arch.size as u64)
            };

            let range = Range::from_offset_size(offset, size)
                .filter(|range| !range.is_empty() && file_range.contains(range))
                .ok_or(Error::FatArchOutOfBounds { index })?;

            if let Some(first) = slices.iter().position(|s| s.range.overlaps(&range)) {
                return Err(Error::FatArchOverlap {
                    first,
                    second: index,
                });
            }

            let bytes = crate::range::slice_range(data, range)
                .ok_or(Error::FatArchOutOfBounds { index })?;
            let slice = Slice::new(bytes, range)?;

            let mask = !CPU_SUBTYPE_MASK;
            if slice.header.header.cputype != cputype
                || slice.header.header.cpusubtype & mask != cpusubtype & mask
            {
                return Err(Error::FatArchMismatch { index });
            }

            slices.push(slice);
        }

        Ok(Self {
            container: if is_64 { Container::Fat64 } else { Container::Fat },
            slices,
        })
    }

    /// Returns true if the file is a universal binary.
    #[inline]
    pub fn is_fat(&self) -> bool {
        self.container != Container::Thin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::testutil::{fat, DylibBuilder};

    #[test]
    fn test_thin_little_endian() {
        let bytes = DylibBuilder::new(CPU_TYPE_X86_64, 3).build();
        let file = MachOFile::parse(&bytes).unwrap();
        assert_eq!(file.container, Container::Thin);
        assert_eq!(file.slices.len(), 1);
        assert_eq!(file.slices[0].arch.name, "x86_64");
        assert!(file.slices[0].header.is_64);
        assert!(file.slices[0].header.is_dylib());
    }

    #[test]
    fn test_thin_big_endian() {
        let bytes = DylibBuilder::new(CPU_TYPE_POWERPC, 0)
            .thirty_two_bit()
            .big_endian()
            .build();
        let file = MachOFile::parse(&bytes).unwrap();
        let slice = &file.slices[0];
        assert_eq!(slice.arch.name, "ppc");
        assert_eq!(slice.header.endian, Endian::Big);
        assert!(!slice.header.is_64);
    }

    #[test]
    fn test_fat_slices() {
        let a = DylibBuilder::new(CPU_TYPE_X86_64, 3).build();
        let b = DylibBuilder::new(CPU_TYPE_ARM64, 0).build();
        for is_64 in [false, true] {
            let bytes = fat(&[&a, &b], is_64);
            let file = MachOFile::parse(&bytes).unwrap();
            assert!(file.is_fat());
            let names: Vec<_> = file.slices.iter().map(|s| s.arch.name).collect();
            assert_eq!(names, ["x86_64", "arm64"]);
            assert!(!file.slices[0].range.overlaps(&file.slices[1].range));
        }
    }

    #[test]
    fn test_bad_magic() {
        assert!(matches!(
            MachOFile::parse(&[0u8; 64]),
            Err(Error::InvalidMagic(0))
        ));
        assert!(MachOFile::parse(&[0xCF, 0xFA]).is_err());
    }

    #[test]
    fn test_fat_arch_out_of_bounds() {
        let a = DylibBuilder::new(CPU_TYPE_X86_64, 3).build();
        let mut bytes = fat(&[&a], false);
        // Grow the first slice's size past the end of the file.
        let size = BigEndian::read_u32(&bytes[20..24]);
        BigEndian::write_u32(&mut bytes[20..24], size + 1);
        assert!(matches!(
            MachOFile::parse(&bytes),
            Err(Error::FatArchOutOfBounds { index: 0 })
        ));
    }

    #[test]
    fn test_fat_arch_overlap() {
        let a = DylibBuilder::new(CPU_TYPE_X86_64, 3).build();
        let b = DylibBuilder::new(CPU_TYPE_X86_64, 3).build();
        let mut bytes = fat(&[&a, &b], false);
        // Point the second slice at the first one's offset.
        let first_offset = BigEndian::read_u32(&bytes[16..20]);
        BigEndian::write_u32(&mut bytes[36..40], first_offset);
        assert!(matches!(
            MachOFile::parse(&bytes),
            Err(Error::FatArchOverlap { first: 0, second: 1 })
        ));
    }

    #[test]
    fn test_fat_arch_mismatch() {
        let a = DylibBuilder::new(CPU_TYPE_X86_64, 3).build();
        let mut bytes = fat(&[&a], false);
        BigEndian::write_u32(&mut bytes[8..12], CPU_TYPE_ARM64);
        assert!(matches!(
            MachOFile::parse(&bytes),
            Err(Error::FatArchMismatch { index: 0 })
        ));
    }

    #[test]
    fn test_fat_without_architectures() {
        let mut bytes = vec![0u8; 8];
        BigEndian::write_u32(&mut bytes[0..4], FAT_MAGIC);
        assert!(matches!(MachOFile::parse(&bytes), Err(Error::NoArchitectures)));
    }
}
