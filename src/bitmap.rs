// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Fixed-width bit vectors used for kernel, routing and resource enables.
//!
//! A [`BitVector`] is an array of 32-bit words where bit 0 is the least
//! significant bit of word 0. Every operation returns a new value; the only
//! in-place mutation is [`BitVector::set_word`], used when marshalling from
//! narrower integer types.
//!
//! Bit indices are never allowed to reach past the last word. Out-of-range
//! indices saturate instead of panicking, in every build profile:
//!
//! - [`BitVector::bit_mask`] returns the empty vector.
//! - [`BitVector::set`] and [`BitVector::unset`] return the input unchanged.
//! - [`BitVector::is_set`] returns `false`.
//! - [`BitVector::set_word`] ignores the write.
//! - [`RoutingBitmap::extract_bits`] reads zeros past the end.

use bytemuck::{Pod, Zeroable};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const WORD_BITS: usize = u32::BITS as usize;

/// Fixed-width bit vector of `WORDS` 32-bit words.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitVector<const WORDS: usize> {
    words: [u32; WORDS],
}

// SAFETY: a transparent wrapper around a `u32` array has no padding and every
// bit pattern is a valid value.
unsafe impl<const WORDS: usize> Zeroable for BitVector<WORDS> {}
unsafe impl<const WORDS: usize> Pod for BitVector<WORDS> {}

/// 128-bit kernel enable bitmap.
pub type KernelBitmap = BitVector<4>;

/// 160-bit routing bitmap (RBM).
pub type RoutingBitmap = BitVector<5>;

/// 32-bit resource bitmap.
pub type ResourceBitmap = BitVector<1>;

/// 256-bit terminal bitmap, one bit per possible terminal index.
pub type TerminalBitmap = BitVector<8>;

impl<const WORDS: usize> BitVector<WORDS> {
    /// Number of addressable bits.
    pub const BITS: usize = WORDS * WORD_BITS;

    /// The empty vector.
    pub const fn clear() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Build a vector directly from its words, least significant first.
    pub const fn from_words(words: [u32; WORDS]) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[u32; WORDS] {
        &self.words
    }

    /// Word `index`, or zero when the index is past the end.
    pub fn word(&self, index: usize) -> u32 {
        self.words.get(index).copied().unwrap_or(0)
    }

    pub fn complement(self) -> Self {
        Self {
            words: self.words.map(|w| !w),
        }
    }

    pub fn union(self, other: Self) -> Self {
        let mut words = self.words;
        for (w, o) in words.iter_mut().zip(other.words) {
            *w |= o;
        }
        Self { words }
    }

    pub fn intersection(self, other: Self) -> Self {
        let mut words = self.words;
        for (w, o) in words.iter_mut().zip(other.words) {
            *w &= o;
        }
        Self { words }
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn is_equal(&self, other: &Self) -> bool {
        self == other
    }

    /// True when every bit of `self` is also set in `other`.
    ///
    /// The empty vector is a subset of everything.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(s, o)| s & !o == 0)
    }

    /// True when every bit of `other` is also set in `self`.
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }

    /// True when the two vectors share at least one bit.
    pub fn intersects(&self, other: &Self) -> bool {
        !self.intersection(*other).is_empty()
    }

    /// Population count.
    pub fn weight(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// True when exactly one bit is set.
    pub fn is_onehot(&self) -> bool {
        self.weight() == 1
    }

    /// The vector with only bit `index` set, or empty when `index` is out of
    /// range.
    pub fn bit_mask(index: usize) -> Self {
        let mut mask = Self::clear();
        if let Some(word) = mask.words.get_mut(index / WORD_BITS) {
            *word = 1 << (index % WORD_BITS);
        }
        mask
    }

    pub fn set(self, index: usize) -> Self {
        self.union(Self::bit_mask(index))
    }

    pub fn unset(self, index: usize) -> Self {
        self.intersection(Self::bit_mask(index).complement())
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.intersects(&Self::bit_mask(index))
    }

    /// Set bit `index`, returning the empty vector if it was already set.
    ///
    /// Used to claim unique ownership: an empty result means the bit had
    /// been claimed before.
    pub fn set_unique(self, index: usize) -> Self {
        if self.is_set(index) {
            Self::clear()
        } else {
            self.set(index)
        }
    }

    /// Shift every bit one position towards index 0.
    pub fn shift_right(self) -> Self {
        let mut words = self.words;
        for i in 0..WORDS {
            let carry = self.words.get(i + 1).map_or(0, |w| w << (WORD_BITS - 1));
            words[i] = (self.words[i] >> 1) | carry;
        }
        Self { words }
    }

    /// Index of the least significant set bit.
    pub fn lowest_set(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| i * WORD_BITS + w.trailing_zeros() as usize)
    }

    /// Iterate the indices of set bits in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..Self::BITS).filter(move |&i| self.is_set(i))
    }

    /// Build a vector with the listed bits set; out-of-range indices are
    /// dropped.
    pub fn from_indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        indices
            .into_iter()
            .fold(Self::clear(), |acc, index| acc.set(index))
    }

    /// Overwrite word `index` with `value`. Writes past the end are ignored.
    pub fn set_word(&mut self, index: usize, value: u32) {
        if let Some(word) = self.words.get_mut(index) {
            *word = value;
        }
    }

    /// Marshal from a 64-bit integer. Bits beyond the vector width are
    /// dropped and words beyond the first two are zero.
    pub fn from_u64(value: u64) -> Self {
        let mut bv = Self::clear();
        bv.set_word(0, value as u32);
        bv.set_word(1, (value >> 32) as u32);
        bv
    }

    /// Marshal into a 64-bit integer. Only the first 64 bits are kept.
    pub fn to_u64(&self) -> u64 {
        u64::from(self.word(0)) | (u64::from(self.word(1)) << 32)
    }
}

impl RoutingBitmap {
    /// Read `size` bits (at most 32) starting at bit `index`.
    ///
    /// The field may straddle two words. Bits past the end of the vector
    /// read as zero and a `size` of zero or above 32 yields zero.
    pub fn extract_bits(&self, index: usize, size: usize) -> u32 {
        if size == 0 || size > WORD_BITS {
            return 0;
        }
        let word = index / WORD_BITS;
        let shift = index % WORD_BITS;
        let joined = u64::from(self.word(word)) | (u64::from(self.word(word + 1)) << WORD_BITS);
        let mask = (1u64 << size) - 1;
        ((joined >> shift) & mask) as u32
    }
}

impl<const WORDS: usize> Default for BitVector<WORDS> {
    fn default() -> Self {
        Self::clear()
    }
}

/// Serialized as the ascending list of set bit indices.
impl<const WORDS: usize> Serialize for BitVector<WORDS> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter_ones())
    }
}

impl<'de, const WORDS: usize> Deserialize<'de> for BitVector<WORDS> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let indices = Vec::<usize>::deserialize(deserializer)?;
        if let Some(index) = indices.iter().find(|&&i| i >= Self::BITS) {
            return Err(de::Error::custom(format!(
                "bit {} out of range for a {} bit vector",
                index,
                Self::BITS
            )));
        }
        Ok(Self::from_indices(indices))
    }
}

impl<const WORDS: usize> fmt::Display for BitVector<WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x")?;
        for w in self.words.iter().rev() {
            write!(f, "{:08x}", w)?;
        }
        Ok(())
    }
}

impl<const WORDS: usize> fmt::Debug for BitVector<WORDS> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BitVector<{}>({})", WORDS, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_right_carries_across_words() {
        let bv = KernelBitmap::bit_mask(32).shift_right();
        assert_eq!(bv, KernelBitmap::bit_mask(31));
        assert!(KernelBitmap::bit_mask(0).shift_right().is_empty());
    }
}
