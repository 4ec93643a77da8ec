//! Byte-extent guards.
//!
//! Every offset or size read out of a binary passes through these helpers
//! before it is used to index a buffer. Arithmetic never wraps: overflow is
//! reported as `None` and turned into an error by the caller.

/// A half-open byte interval `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Range {
    /// First byte in the range
    pub begin: u64,
    /// One past the last byte in the range
    pub end: u64,
}

impl Range {
    /// Creates a range, returning `None` if `begin > end`.
    #[inline]
    pub const fn new(begin: u64, end: u64) -> Option<Self> {
        if begin > end {
            None
        } else {
            Some(Self { begin, end })
        }
    }

    /// Creates a range from an offset and a size, checking for overflow.
    #[inline]
    pub fn from_offset_size(offset: u64, size: u64) -> Option<Self> {
        let end = checked_add(offset, size)?;
        Some(Self { begin: offset, end })
    }

    /// Returns the number of bytes covered.
    #[inline]
    pub const fn size(&self) -> u64 {
        self.end - self.begin
    }

    /// Returns true if the range covers no bytes.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    /// Returns true if `inner` lies entirely within `self`.
    #[inline]
    pub const fn contains(&self, inner: &Range) -> bool {
        range_contains(*self, *inner)
    }

    /// Returns true if `self` and `other` share at least one byte.
    #[inline]
    pub const fn overlaps(&self, other: &Range) -> bool {
        ranges_overlap(*self, *other)
    }

    /// Returns true if `offset` lies within the range.
    #[inline]
    pub const fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.begin && offset < self.end
    }

    /// Returns the range as `usize` bounds suitable for slicing.
    ///
    /// Fails on targets where the range does not fit in the address space.
    #[inline]
    pub fn as_usize(&self) -> Option<std::ops::Range<usize>> {
        let begin = usize::try_from(self.begin).ok()?;
        let end = usize::try_from(self.end).ok()?;
        Some(begin..end)
    }
}

/// Adds two values, returning `None` on overflow.
#[inline(always)]
pub const fn checked_add(a: u64, b: u64) -> Option<u64> {
    a.checked_add(b)
}

/// Multiplies two values, returning `None` on overflow.
#[inline(always)]
pub const fn checked_mul(a: u64, b: u64) -> Option<u64> {
    a.checked_mul(b)
}

/// Returns true if `inner` lies entirely within `outer`.
///
/// An empty `inner` is contained if its position lies within `outer`
/// (inclusive of `outer.end`).
#[inline]
pub const fn range_contains(outer: Range, inner: Range) -> bool {
    inner.begin >= outer.begin && inner.end <= outer.end
}

/// Returns true if two ranges share at least one byte.
///
/// Empty ranges never overlap anything.
#[inline]
pub const fn ranges_overlap(a: Range, b: Range) -> bool {
    if a.begin == a.end || b.begin == b.end {
        return false;
    }
    a.begin < b.end && b.begin < a.end
}

/// Returns the slice of `data` covered by `range`, or `None` if out of bounds.
#[inline]
pub fn slice_range(data: &[u8], range: Range) -> Option<&[u8]> {
    let bounds = range.as_usize()?;
    data.get(bounds)
}
