//! Freelist slab allocator.
//!
//! Slots are kept in a `Vec<Entry<T>>`. Removing a value turns its slot into
//! the head of an intrusive freelist, so the next insert reuses it and every
//! other handle stays stable.

use std::fmt;
use std::mem;
use std::ops::{Index, IndexMut};

use super::entry::Entry;
use super::index_types::SlabIndex;

/// Initial number of slots to allocate.
const INITIAL_SLOTS: usize = 64;

pub struct Slab<T> {
    entries: Vec<Entry<T>>,

    /// Logical element count (occupied slots only).
    len: usize,

    /// Head of the freelist (index of the next available slot).
    next: usize,
}

impl<T> Slab<T> {
    /// Creates a new empty slab with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_SLOTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            len: 0,
            next: 0,
        }
    }

    /// Inserts a value, returning its stable index.
    pub fn insert(&mut self, value: T) -> SlabIndex {
        let key = self.next;
        if key == self.entries.len() {
            self.entries.push(Entry::Occupied(value));
            self.next = self.entries.len();
        } else {
            // Reusing a vacant slot from the freelist
            let next_free = match self.entries[key] {
                Entry::Vacant(next) => next,
                Entry::Occupied(_) => unreachable!("freelist head points at an occupied slot"),
            };
            self.entries[key] = Entry::Occupied(value);
            self.next = next_free;
        }
        self.len += 1;
        SlabIndex::new(key)
    }

    /// Gets a reference to the value at `index`.
    pub fn get(&self, index: SlabIndex) -> Option<&T> {
        self.entries.get(index.get()).and_then(Entry::as_ref)
    }

    /// Gets a mutable reference to the value at `index`.
    pub fn get_mut(&mut self, index: SlabIndex) -> Option<&mut T> {
        self.entries.get_mut(index.get()).and_then(Entry::as_mut)
    }

    /// Removes the value at `index` if it exists, returning it.
    pub fn try_remove(&mut self, index: SlabIndex) -> Option<T> {
        let slot = index.get();
        let entry = self.entries.get_mut(slot)?;
        if let Entry::Vacant(_) = entry {
            return None;
        }
        let prev = mem::replace(entry, Entry::Vacant(self.next));
        self.next = slot;
        self.len -= 1;
        match prev {
            Entry::Occupied(value) => Some(value),
            Entry::Vacant(_) => None,
        }
    }

    /// Returns the number of occupied slots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the slab is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every value and resets the freelist.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.len = 0;
        self.next = 0;
    }

    /// Returns an iterator over occupied entries.
    pub fn iter(&self) -> SlabIter<'_, T> {
        SlabIter {
            slab: self,
            index: 0,
        }
    }

    /// Returns an iterator over occupied entries with mutable access.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SlabIndex, &mut T)> {
        self.entries
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_mut().map(|value| (SlabIndex::new(slot), value)))
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<SlabIndex> for Slab<T> {
    type Output = T;

    fn index(&self, index: SlabIndex) -> &Self::Output {
        self.get(index).expect("invalid slab index")
    }
}

impl<T> IndexMut<SlabIndex> for Slab<T> {
    fn index_mut(&mut self, index: SlabIndex) -> &mut Self::Output {
        self.get_mut(index).expect("invalid slab index")
    }
}

impl<T> fmt::Debug for Slab<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slab")
            .field("len", &self.len)
            .field("next", &self.next)
            .field("slots", &self.entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Slab Iterator
// ---------------------------------------------------------------------------

/// Iterator over occupied entries in a Slab.
pub struct SlabIter<'a, T> {
    slab: &'a Slab<T>,
    index: usize,
}

impl<'a, T> Iterator for SlabIter<'a, T> {
    type Item = (SlabIndex, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(entry) = self.slab.entries.get(self.index) {
            let idx = SlabIndex::new(self.index);
            self.index += 1;
            if let Some(value) = entry.as_ref() {
                return Some((idx, value));
            }
        }
        None
    }
}

impl<'a, T> IntoIterator for &'a Slab<T> {
    type Item = (SlabIndex, &'a T);
    type IntoIter = SlabIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let mut slab = Slab::new();
        let a = slab.insert("a");
        let b = slab.insert("b");
        assert_eq!(slab.len(), 2);
        assert_eq!(slab.get(a), Some(&"a"));
        assert_eq!(slab[b], "b");
    }

    #[test]
    fn removed_slots_are_reused_last_in_first_out() {
        let mut slab = Slab::new();
        let a = slab.insert(1);
        let b = slab.insert(2);
        let c = slab.insert(3);

        assert_eq!(slab.try_remove(a), Some(1));
        assert_eq!(slab.try_remove(c), Some(3));
        assert_eq!(slab.len(), 1);

        assert_eq!(slab.insert(4), c);
        assert_eq!(slab.insert(5), a);
        assert_eq!(slab[b], 2);
        assert_eq!(slab.len(), 3);
    }

    #[test]
    fn double_remove_is_a_no_op() {
        let mut slab = Slab::new();
        let a = slab.insert("x");
        assert_eq!(slab.try_remove(a), Some("x"));
        assert_eq!(slab.try_remove(a), None);
        assert_eq!(slab.try_remove(SlabIndex::new(42)), None);
        assert!(slab.is_empty());
    }

    #[test]
    fn iter_skips_vacant_slots() {
        let mut slab = Slab::new();
        let a = slab.insert('a');
        slab.insert('b');
        slab.insert('c');
        slab.try_remove(a);

        let values: Vec<char> = slab.iter().map(|(_, value)| *value).collect();
        assert_eq!(values, vec!['b', 'c']);

        for (_, value) in slab.iter_mut() {
            *value = value.to_ascii_uppercase();
        }
        let values: Vec<char> = (&slab).into_iter().map(|(_, value)| *value).collect();
        assert_eq!(values, vec!['B', 'C']);

        slab.clear();
        assert!(slab.is_empty());
        assert_eq!(slab.iter().count(), 0);
    }
}
