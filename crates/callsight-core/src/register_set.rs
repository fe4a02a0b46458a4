//! Fixed-width register bit sets indexed by ABI register index.

use fixedbitset::FixedBitSet;

/// A set of registers, one bit per ABI-tracked register.
///
/// The width is fixed at construction to the size of the ABI universe; a bit
/// outside the universe can never be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSet {
    bits: FixedBitSet,
}

impl RegisterSet {
    /// Creates an empty set over a universe of `width` registers.
    pub fn empty(width: usize) -> Self {
        Self {
            bits: FixedBitSet::with_capacity(width),
        }
    }

    /// Creates a set over `width` registers with the given indices set.
    pub fn from_indices(width: usize, indices: &[usize]) -> Self {
        let mut set = Self::empty(width);
        for &i in indices {
            set.insert(i);
        }
        set
    }

    /// The universe width.
    pub fn width(&self) -> usize {
        self.bits.len()
    }

    /// Sets the bit for an ABI index. Panics if the index is outside the
    /// universe.
    pub fn insert(&mut self, index: usize) {
        self.bits.insert(index);
    }

    /// Clears the bit for an ABI index.
    pub fn remove(&mut self, index: usize) {
        self.bits.set(index, false);
    }

    /// Returns true if the bit for an ABI index is set.
    pub fn contains(&self, index: usize) -> bool {
        self.bits.contains(index)
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &Self) {
        self.bits.union_with(&other.bits);
    }

    /// In-place intersection.
    pub fn intersect_with(&mut self, other: &Self) {
        self.bits.intersect_with(&other.bits);
    }

    /// Returns the complement within the universe.
    pub fn complement(&self) -> Self {
        let mut bits = self.bits.clone();
        bits.toggle_range(..);
        Self { bits }
    }

    /// Returns true if no bit is set.
    pub fn is_empty(&self) -> bool {
        self.bits.is_clear()
    }

    /// Number of set bits.
    pub fn count(&self) -> usize {
        self.bits.count_ones(..)
    }

    /// Iterates the set ABI indices in ascending order.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits.ones()
    }

    /// Returns true if every bit of `self` is also set in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.bits.is_subset(&other.bits)
    }
}
