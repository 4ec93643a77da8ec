//! Variable-length bit set recording architecture membership.
//!
//! Each exported symbol or metadata string carries a `BitList` whose bit `i`
//! is set when the item was observed in the `i`-th architecture of the file.
//! Lists shorter than 64 bits live in a single inline word; longer lists
//! spill to the heap once, at creation, and never move back.

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::error::{Error, Result};

/// Number of bits that fit in the inline representation.
pub const INLINE_CAPACITY: usize = 63;

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed-length set of bits that only ever gains members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitList {
    words: SmallVec<[u64; 1]>,
    length: usize,
    set_count: usize,
}

impl BitList {
    /// Creates a list of `length` cleared bits.
    ///
    /// Fails only if the heap words cannot be allocated.
    pub fn new(length: usize) -> Result<Self> {
        let mut words: SmallVec<[u64; 1]> = SmallVec::new();
        if length <= INLINE_CAPACITY {
            words.push(0);
        } else {
            // Always spill past the inline threshold, even when one word would do.
            let count = length.div_ceil(WORD_BITS);
            words
                .try_grow(count.max(2))
                .map_err(|_| Error::OutOfMemory { requested: count })?;
            words.resize(count, 0);
        }

        Ok(Self {
            words,
            length,
            set_count: 0,
        })
    }

    /// Returns true if the bits live in a heap allocation.
    #[inline]
    pub fn is_on_heap(&self) -> bool {
        self.words.spilled()
    }

    /// Returns the number of bits in the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns true if the list holds no bits at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the number of set bits.
    #[inline]
    pub fn set_count(&self) -> usize {
        self.set_count
    }

    /// Returns the backing words, lowest bit index first.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Sets bit `index`. Returns true if the bit was previously clear.
    ///
    /// Indexes past the end of the list are ignored.
    pub fn set_bit(&mut self, index: usize) -> bool {
        debug_assert!(index < self.length, "bit {index} out of range");
        if index >= self.length {
            return false;
        }

        let mask = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if *word & mask != 0 {
            return false;
        }

        *word |= mask;
        self.set_count += 1;
        true
    }

    /// Sets bits `[0, n)`.
    pub fn set_first_n(&mut self, n: usize) {
        let n = n.min(self.length);
        let full_words = n / WORD_BITS;
        let tail = n % WORD_BITS;

        let words = &mut self.words;
        for word in &mut words[..full_words] {
            *word = u64::MAX;
        }
        if tail != 0 {
            words[full_words] |= (1u64 << tail) - 1;
        }

        self.set_count = self.words().iter().map(|w| w.count_ones() as usize).sum();
    }

    /// Returns true if bit `index` is set.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        if index >= self.length {
            return false;
        }
        self.words()[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Orders two lists that are known to have the same set count.
    ///
    /// Compares raw words, so the order is only meaningful as a tie-breaker.
    #[inline]
    pub fn equal_counts_compare(&self, other: &BitList) -> Ordering {
        debug_assert_eq!(self.set_count, other.set_count);
        self.words.as_slice().cmp(other.words.as_slice())
    }

    /// Tests two lists with the same set count for equality.
    #[inline]
    pub fn equal_counts_is_equal(&self, other: &BitList) -> bool {
        self.equal_counts_compare(other) == Ordering::Equal
    }

    /// Returns the index of the first set bit.
    #[inline]
    pub fn find_first_bit(&self) -> Option<usize> {
        self.find_from(0)
    }

    /// Returns the index of the first set bit after `last`.
    #[inline]
    pub fn find_bit_after_last(&self, last: usize) -> Option<usize> {
        self.find_from(last.checked_add(1)?)
    }

    fn find_from(&self, start: usize) -> Option<usize> {
        if start >= self.length {
            return None;
        }

        let words = self.words();
        let mut word_index = start / WORD_BITS;
        let mut word = words[word_index] & (u64::MAX << (start % WORD_BITS));

        loop {
            if word != 0 {
                let index = word_index * WORD_BITS + word.trailing_zeros() as usize;
                return (index < self.length).then_some(index);
            }
            word_index += 1;
            word = *words.get(word_index)?;
        }
    }

    /// Iterates over the indexes of set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.find_first_bit(), move |&last| {
            self.find_bit_after_last(last)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_threshold() {
        for n in 0..64 {
            assert!(!BitList::new(n).unwrap().is_on_heap(), "length {n}");
        }
        for n in [64, 65, 128, 1000] {
            assert!(BitList::new(n).unwrap().is_on_heap(), "length {n}");
        }
    }

    #[test]
    fn test_set_and_get() {
        for length in [5usize, 63, 64, 130] {
            for index in [0, length / 2, length - 1] {
                let mut bits = BitList::new(length).unwrap();
                assert!(bits.set_bit(index));
                for other in 0..length {
                    assert_eq!(bits.get(other), other == index, "length {length} bit {other}");
                }
                assert_eq!(bits.set_count(), 1);
            }
        }
    }

    #[test]
    fn test_set_is_idempotent() {
        let mut bits = BitList::new(10).unwrap();
        assert!(bits.set_bit(3));
        assert!(!bits.set_bit(3));
        assert_eq!(bits.set_count(), 1);

        bits.set_bit(7);
        bits.set_first_n(2);
        assert!(bits.get(3) && bits.get(7) && bits.get(0) && bits.get(1));
        assert_eq!(bits.set_count(), 4);
    }

    #[test]
    fn test_set_first_n_heap() {
        let mut bits = BitList::new(70).unwrap();
        bits.set_first_n(66);
        assert_eq!(bits.set_count(), 66);
        assert!(bits.get(65));
        assert!(!bits.get(66));
        assert_eq!(bits.iter().count(), 66);
    }

    #[test]
    fn test_iteration() {
        let mut bits = BitList::new(200).unwrap();
        for i in [1, 63, 64, 150, 199] {
            bits.set_bit(i);
        }
        assert_eq!(bits.iter().collect::<Vec<_>>(), vec![1, 63, 64, 150, 199]);
        assert_eq!(bits.find_first_bit(), Some(1));
        assert_eq!(bits.find_bit_after_last(150), Some(199));
        assert_eq!(bits.find_bit_after_last(199), None);

        let empty = BitList::new(4).unwrap();
        assert_eq!(empty.find_first_bit(), None);
    }

    #[test]
    fn test_equal_counts() {
        let mut a = BitList::new(4).unwrap();
        let mut b = BitList::new(4).unwrap();
        a.set_bit(0);
        b.set_bit(2);
        assert_eq!(a.equal_counts_compare(&b), Ordering::Less);
        assert!(!a.equal_counts_is_equal(&b));

        b.set_bit(0);
        a.set_bit(2);
        assert!(a.equal_counts_is_equal(&b));
    }
}
