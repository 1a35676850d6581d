//! Slab index type for type-safe slot addressing.

use std::fmt;

/// A compact 32-bit handle to a slab slot.
///
/// Handles stay valid until the slot is removed; a freed slot may be handed
/// out again by a later insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SlabIndex(u32);

impl SlabIndex {
    /// Creates a new SlabIndex from a usize.
    ///
    /// # Panics
    /// Panics if `index` does not fit in a `u32`.
    #[inline]
    pub fn new(index: usize) -> Self {
        let index = u32::try_from(index).expect("slab index must fit in u32");
        Self(index)
    }

    /// Returns the index as a usize.
    #[inline]
    pub fn get(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlabIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slab_index_round_trips() {
        let idx = SlabIndex::new(100);
        assert_eq!(idx.get(), 100);
        assert_eq!(idx.to_string(), "#100");
        assert!(SlabIndex::new(1) < SlabIndex::new(2));
    }

    #[test]
    #[should_panic(expected = "slab index must fit in u32")]
    fn slab_index_rejects_oversized() {
        SlabIndex::new(u32::MAX as usize + 1);
    }
}
