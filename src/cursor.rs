//! Bounds-checked reading over borrowed byte slices.
//!
//! All offset arithmetic against untrusted Mach-O data goes through
//! [`Cursor`], which can only hand out bytes that lie inside its slice.
//! Multi-byte integers are read with `byteorder` in the byte order of the
//! slice being decoded.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::error::{Error, Result};
use crate::macho::Swap;

/// Byte order of a Mach-O slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Little-endian (x86, arm)
    #[default]
    Little,
    /// Big-endian (ppc, fat headers)
    Big,
}

impl Endian {
    /// Returns true if values need swapping on this host.
    #[inline(always)]
    pub const fn needs_swap(self) -> bool {
        match self {
            Endian::Little => cfg!(target_endian = "big"),
            Endian::Big => cfg!(target_endian = "little"),
        }
    }

    /// Reads a u16 in this byte order. `data` must hold at least 2 bytes.
    #[inline(always)]
    pub fn read_u16(self, data: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(data),
            Endian::Big => BigEndian::read_u16(data),
        }
    }

    /// Reads a u32 in this byte order. `data` must hold at least 4 bytes.
    #[inline(always)]
    pub fn read_u32(self, data: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(data),
            Endian::Big => BigEndian::read_u32(data),
        }
    }

    /// Reads a u64 in this byte order. `data` must hold at least 8 bytes.
    #[inline(always)]
    pub fn read_u64(self, data: &[u8]) -> u64 {
        match self {
            Endian::Little => LittleEndian::read_u64(data),
            Endian::Big => BigEndian::read_u64(data),
        }
    }
}

// =============================================================================
// ULEB128
// =============================================================================

/// Decodes an unsigned LEB128 value from the start of `data`.
///
/// Returns `(value, bytes_consumed)`, or `None` if the encoding runs off the
/// end of `data` or does not fit in 64 bits. A partial value is never
/// returned.
#[inline(always)]
pub fn read_uleb128(data: &[u8]) -> Option<(u64, usize)> {
    let b0 = *data.first()?;

    // Fast path: single byte (0-127) - most common case
    if b0 < 0x80 {
        return Some((b0 as u64, 1));
    }

    let b1 = *data.get(1)?;

    // Fast path: two bytes (128-16383)
    if b1 < 0x80 {
        let value = ((b0 & 0x7F) as u64) | ((b1 as u64) << 7);
        return Some((value, 2));
    }

    let mut result: u64 = 0;
    let mut shift = 0u32;

    for (i, &byte) in data.iter().enumerate() {
        let payload = (byte & 0x7F) as u64;
        if shift > 63 || (shift == 63 && payload > 1) {
            return None;
        }

        result |= payload << shift;

        if byte < 0x80 {
            return Some((result, i + 1));
        }
        shift += 7;
    }

    None
}

/// Appends the unsigned LEB128 encoding of `value` to `out`.
pub fn write_uleb128(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Finds the first NUL byte in `data`.
#[inline(always)]
pub fn find_nul(data: &[u8]) -> Option<usize> {
    memchr::memchr(0, data)
}

// =============================================================================
// Cursor
// =============================================================================

/// A read position over a borrowed slice.
///
/// Offsets reported in errors are relative to `base`, which callers set to
/// the slice's position in the enclosing file so messages point at real bytes.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
    base: u64,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor at the start of `data`.
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
            base: 0,
        }
    }

    /// Sets the file offset of the slice's first byte, used in error offsets.
    pub fn with_base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }

    /// Returns the byte order used for integer reads.
    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Returns the current position within the slice.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the current position as an absolute file offset.
    #[inline]
    pub fn file_offset(&self) -> u64 {
        self.base.saturating_add(self.pos as u64)
    }

    /// Returns the whole underlying slice.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns true if no bytes remain.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Moves to an absolute position within the slice.
    pub fn seek(&mut self, pos: u64) -> Result<()> {
        match usize::try_from(pos) {
            Ok(pos) if pos <= self.data.len() => {
                self.pos = pos;
                Ok(())
            }
            _ => Err(Error::buffer_too_small(pos, self.data.len() as u64)),
        }
    }

    /// Returns the next `len` bytes and advances past them.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                Error::buffer_too_small(
                    (self.pos as u64).saturating_add(len as u64),
                    self.data.len() as u64,
                )
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Advances `len` bytes without reading them.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Reads one byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a u16 in the cursor's byte order.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(self.endian.read_u16(bytes))
    }

    /// Reads a u32 in the cursor's byte order.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(self.endian.read_u32(bytes))
    }

    /// Reads a u64 in the cursor's byte order.
    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        Ok(self.endian.read_u64(bytes))
    }

    /// Reads an unsigned LEB128 value.
    pub fn read_uleb128(&mut self) -> Result<u64> {
        let (value, len) = read_uleb128(&self.data[self.pos..]).ok_or(Error::InvalidUleb128 {
            offset: self.file_offset(),
        })?;
        self.pos += len;
        Ok(value)
    }

    /// Reads a NUL-terminated string of at most `limit` bytes (NUL excluded).
    ///
    /// Fails if no NUL is found before `limit` or the end of the slice.
    /// The returned slice excludes the NUL; the cursor moves past it.
    pub fn read_cstr(&mut self, limit: usize) -> Result<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let window = &rest[..rest.len().min(limit.saturating_add(1))];
        let len = find_nul(window).ok_or_else(|| {
            Error::buffer_too_small(
                (self.pos as u64).saturating_add(window.len() as u64 + 1),
                self.data.len() as u64,
            )
        })?;
        let s = &rest[..len];
        self.pos += len + 1;
        Ok(s)
    }

    /// Reads a zerocopy structure from the current position.
    ///
    /// The value is copied out in file byte order; callers swap it if needed.
    pub fn read_struct<T: FromBytes + KnownLayout + Immutable>(&mut self) -> Result<T> {
        let bytes = self.read_bytes(std::mem::size_of::<T>())?;
        T::read_from_bytes(bytes).map_err(|_| {
            Error::buffer_too_small(std::mem::size_of::<T>() as u64, bytes.len() as u64)
        })
    }

    /// Reads a Mach-O structure and converts it to host byte order.
    #[inline]
    pub fn read_swapped<T>(&mut self) -> Result<T>
    where
        T: FromBytes + KnownLayout + Immutable + Swap,
    {
        let endian = self.endian;
        Ok(self.read_struct::<T>()?.to_endian(endian))
    }
}
