//! Watch records indexed by id, by kernel object and by path.
//!
//! Records live in a [`Slab`]; the three maps hold slab indices. Every record
//! is reachable by id and, once it has a path, by path. Object keyed records
//! are also reachable by object.

use std::collections::BTreeMap;
use std::ops::Bound;

use fnv::FnvHashMap;

use super::object_id::ObjectId;
use super::record::{WatchId, WatchKey, WatchRecord};
use crate::storage::{Slab, SlabIndex};

/// What to do when an inserted record's path already belongs to another
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathConflict {
    /// Evict the other record and return it to the caller.
    Displace,
    /// Leave the path pointing at the other record. The new record is then
    /// reachable by id and object only, so path lookups and prefix renames
    /// pass it by.
    Keep,
}

#[derive(Debug)]
pub struct Inserted {
    pub slot: SlabIndex,
    /// `true` when the id or object was already known and that record was
    /// updated in place.
    pub updated: bool,
    pub displaced: Option<WatchRecord>,
}

#[derive(Debug, Default)]
pub struct WatchIndex {
    records: Slab<WatchRecord>,
    by_id: FnvHashMap<WatchId, SlabIndex>,
    by_object: BTreeMap<ObjectId, SlabIndex>,
    by_path: BTreeMap<String, SlabIndex>,
}

impl WatchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Adds `record`, or folds it into the record already registered under
    /// the same id or object.
    pub fn insert(&mut self, record: WatchRecord, conflict: PathConflict) -> Inserted {
        if let Some(slot) = self.find_existing(&record) {
            let WatchRecord {
                path,
                mask,
                dir_handle,
                marked,
                ..
            } = record;
            let displaced = self.set_path(slot, path);
            if let Some(existing) = self.records.get_mut(slot) {
                existing.mask = mask;
                existing.marked |= marked;
                if dir_handle.is_some() {
                    existing.dir_handle = dir_handle;
                }
            }
            return Inserted {
                slot,
                updated: true,
                displaced,
            };
        }

        let displaced = match (conflict, self.by_path.get(&record.path)) {
            (PathConflict::Displace, Some(&other)) => self.remove(other),
            _ => None,
        };
        let id = record.id;
        let object = record.key.object().cloned();
        let path = record.path.clone();
        let slot = self.records.insert(record);

        self.by_id.insert(id, slot);
        if let Some(object) = object {
            self.by_object.insert(object, slot);
        }
        if !path.is_empty() {
            self.by_path.entry(path).or_insert(slot);
        }
        Inserted {
            slot,
            updated: false,
            displaced,
        }
    }

    /// Removes the record at `slot`. Absent slots are a no-op.
    pub fn remove(&mut self, slot: SlabIndex) -> Option<WatchRecord> {
        let record = self.records.try_remove(slot)?;
        if self.by_id.get(&record.id) == Some(&slot) {
            self.by_id.remove(&record.id);
        }
        if let WatchKey::Object(object) = &record.key {
            if self.by_object.get(object) == Some(&slot) {
                self.by_object.remove(object);
            }
        }
        if self.by_path.get(&record.path) == Some(&slot) {
            self.by_path.remove(&record.path);
        }
        Some(record)
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_object.clear();
        self.by_path.clear();
        self.records.clear();
    }

    pub fn get(&self, slot: SlabIndex) -> Option<&WatchRecord> {
        self.records.get(slot)
    }

    pub fn get_mut(&mut self, slot: SlabIndex) -> Option<&mut WatchRecord> {
        self.records.get_mut(slot)
    }

    pub fn find_by_id(&self, id: WatchId) -> Option<SlabIndex> {
        self.by_id.get(&id).copied()
    }

    pub fn find_by_object(&self, object: &ObjectId) -> Option<SlabIndex> {
        self.by_object.get(object).copied()
    }

    pub fn find_by_path(&self, path: &str) -> Option<SlabIndex> {
        self.by_path.get(path).copied()
    }

    pub fn record_by_id(&self, id: WatchId) -> Option<&WatchRecord> {
        self.find_by_id(id).and_then(|slot| self.records.get(slot))
    }

    pub fn record_by_id_mut(&mut self, id: WatchId) -> Option<&mut WatchRecord> {
        let slot = self.find_by_id(id)?;
        self.records.get_mut(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchRecord> {
        self.records.iter().map(|(_, record)| record)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WatchRecord> {
        self.records.iter_mut().map(|(_, record)| record)
    }

    /// Moves the record at `slot` to `path`, returning whichever record held
    /// that path before.
    pub fn set_path(&mut self, slot: SlabIndex, path: String) -> Option<WatchRecord> {
        let old = self.records.get(slot)?.path.clone();
        if old == path {
            if !path.is_empty() {
                self.by_path.entry(path).or_insert(slot);
            }
            return None;
        }
        if self.by_path.get(&old) == Some(&slot) {
            self.by_path.remove(&old);
        }

        let displaced = match self.by_path.get(&path) {
            Some(&other) if other != slot => self.remove(other),
            _ => None,
        };
        if !path.is_empty() {
            self.by_path.insert(path.clone(), slot);
        }
        if let Some(record) = self.records.get_mut(slot) {
            record.path = path;
        }
        displaced
    }

    /// Renames the record at exactly `old`.
    pub fn rename(&mut self, old: &str, new: &str) -> Option<WatchRecord> {
        if old.is_empty() || new.is_empty() || old == new {
            return None;
        }
        let slot = self.find_by_path(old)?;
        self.set_path(slot, new.to_string())
    }

    /// Replaces `old_prefix` with `new_prefix` in every path that starts with
    /// it. The match is a plain string prefix.
    pub fn rename_prefix(&mut self, old_prefix: &str, new_prefix: &str) -> Vec<WatchRecord> {
        if old_prefix.is_empty() || new_prefix.is_empty() || old_prefix == new_prefix {
            return Vec::new();
        }

        let moved: Vec<(String, SlabIndex)> = self
            .by_path
            .range::<str, _>((Bound::Included(old_prefix), Bound::Unbounded))
            .take_while(|(path, _)| path.starts_with(old_prefix))
            .map(|(path, slot)| (path.clone(), *slot))
            .collect();
        for (path, _) in &moved {
            self.by_path.remove(path);
        }

        let mut displaced = Vec::new();
        for (path, slot) in moved {
            let renamed = format!("{new_prefix}{}", &path[old_prefix.len()..]);
            if let Some(&other) = self.by_path.get(&renamed) {
                displaced.extend(self.remove(other));
            }
            self.by_path.insert(renamed.clone(), slot);
            if let Some(record) = self.records.get_mut(slot) {
                record.path = renamed;
            }
        }
        displaced
    }

    fn find_existing(&self, record: &WatchRecord) -> Option<SlabIndex> {
        match &record.key {
            WatchKey::Kernel(_) => self.find_by_id(record.id),
            WatchKey::Object(object) => self.find_by_object(object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::fanotify::FAN_EVENT_INFO_TYPE_DFID;
    use crate::kernel::handle::Fsid;
    use crate::mask::EventMask;

    fn kernel(wd: i32, path: &str) -> WatchRecord {
        WatchRecord::new(
            WatchId(wd),
            WatchKey::Kernel(wd),
            path.to_string(),
            EventMask::ALL_EVENTS,
        )
    }

    fn object(id: i32, handle: u8, path: &str) -> WatchRecord {
        let object = ObjectId::new(FAN_EVENT_INFO_TYPE_DFID, Fsid([1, 2]), 1, &[handle; 8], None);
        WatchRecord::new(
            WatchId(id),
            WatchKey::Object(object),
            path.to_string(),
            EventMask::ALL_EVENTS,
        )
    }

    fn path_of(index: &WatchIndex, wd: i32) -> Option<&str> {
        index.record_by_id(WatchId(wd)).map(|r| r.path.as_str())
    }

    #[test]
    fn kept_records_stay_out_of_path_lookups() {
        let mut index = WatchIndex::new();
        let first = index.insert(object(1, 1, "/w/a/x"), PathConflict::Keep);
        let second = index.insert(object(2, 2, "/w/a/x"), PathConflict::Keep);
        assert!(second.displaced.is_none());
        assert_eq!(index.len(), 2);
        assert_eq!(index.find_by_path("/w/a/x"), Some(first.slot));
        assert_eq!(index.find_by_id(WatchId(2)), Some(second.slot));

        let displaced = index.rename_prefix("/w/a/", "/w/b/");
        assert!(displaced.is_empty());
        assert_eq!(path_of(&index, 1), Some("/w/b/x"));
        assert_eq!(path_of(&index, 2), Some("/w/a/x"));
    }

    #[test]
    fn lookups_agree_after_insert_and_remove() {
        let mut index = WatchIndex::new();
        let inserted = index.insert(kernel(1, "/w/"), PathConflict::Displace);
        assert!(!inserted.updated);
        assert_eq!(index.find_by_path("/w/"), Some(inserted.slot));
        assert_eq!(index.find_by_id(WatchId(1)), Some(inserted.slot));

        let removed = index.remove(inserted.slot).expect("present");
        assert_eq!(removed.path, "/w/");
        assert!(index.find_by_path("/w/").is_none());
        assert!(index.find_by_id(WatchId(1)).is_none());
        assert!(index.remove(inserted.slot).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn duplicate_id_updates_in_place() {
        let mut index = WatchIndex::new();
        let first = index.insert(kernel(4, "/old/"), PathConflict::Displace);
        let mut again = kernel(4, "/new/");
        again.mask = EventMask::MODIFY;
        let second = index.insert(again, PathConflict::Displace);

        assert!(second.updated);
        assert_eq!(first.slot, second.slot);
        assert_eq!(index.len(), 1);
        assert_eq!(path_of(&index, 4), Some("/new/"));
        assert!(index.find_by_path("/old/").is_none());
        assert_eq!(index.get(first.slot).unwrap().mask, EventMask::MODIFY);
    }

    #[test]
    fn duplicate_object_updates_in_place() {
        let mut index = WatchIndex::new();
        index.insert(object(1, 7, "/d/"), PathConflict::Keep);
        let again = index.insert(object(2, 7, "/d/"), PathConflict::Keep);
        assert!(again.updated);
        assert_eq!(index.len(), 1);
        assert!(index.record_by_id(WatchId(2)).is_none());
    }

    #[test]
    fn path_conflicts_displace_or_keep() {
        let mut index = WatchIndex::new();
        index.insert(kernel(1, "/a"), PathConflict::Displace);
        let kept = index.insert(kernel(2, "/a"), PathConflict::Keep);
        assert!(kept.displaced.is_none());
        assert_eq!(index.find_by_path("/a"), index.find_by_id(WatchId(1)));

        let displaced = index.insert(kernel(3, "/b"), PathConflict::Displace);
        assert!(displaced.displaced.is_none());
        let taken = index.insert(kernel(4, "/b"), PathConflict::Displace);
        assert_eq!(taken.displaced.map(|r| r.id), Some(WatchId(3)));
        assert_eq!(index.find_by_path("/b"), Some(taken.slot));
    }

    #[test]
    fn rename_rekeys_only_exact_match() {
        let mut index = WatchIndex::new();
        index.insert(kernel(1, "/a/b"), PathConflict::Displace);
        index.insert(kernel(2, "/a/bc"), PathConflict::Displace);

        assert!(index.rename("/a/b", "/a/x").is_none());
        assert_eq!(path_of(&index, 1), Some("/a/x"));
        assert_eq!(path_of(&index, 2), Some("/a/bc"));

        // no-ops
        assert!(index.rename("/missing", "/y").is_none());
        assert!(index.rename("", "/y").is_none());
        assert!(index.rename("/a/x", "").is_none());
        assert_eq!(path_of(&index, 1), Some("/a/x"));
    }

    #[test]
    fn rename_onto_taken_path_displaces() {
        let mut index = WatchIndex::new();
        index.insert(kernel(1, "/a"), PathConflict::Displace);
        index.insert(kernel(2, "/b"), PathConflict::Displace);
        let displaced = index.rename("/a", "/b").expect("displaced");
        assert_eq!(displaced.id, WatchId(2));
        assert_eq!(index.find_by_path("/b"), index.find_by_id(WatchId(1)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn rename_prefix_moves_subtree() {
        let mut index = WatchIndex::new();
        index.insert(kernel(1, "/w/a/"), PathConflict::Displace);
        index.insert(kernel(2, "/w/a/b/"), PathConflict::Displace);
        index.insert(kernel(3, "/w/ab/"), PathConflict::Displace);
        index.insert(kernel(4, "/w/z/"), PathConflict::Displace);

        let displaced = index.rename_prefix("/w/a/", "/w/b/");
        assert!(displaced.is_empty());
        assert_eq!(path_of(&index, 1), Some("/w/b/"));
        assert_eq!(path_of(&index, 2), Some("/w/b/b/"));
        assert_eq!(path_of(&index, 3), Some("/w/ab/"));
        assert_eq!(path_of(&index, 4), Some("/w/z/"));
        assert!(index.find_by_path("/w/a/b/").is_none());
        assert_eq!(index.find_by_path("/w/b/b/"), index.find_by_id(WatchId(2)));
    }

    #[test]
    fn rename_prefix_is_plain_string_prefix() {
        let mut index = WatchIndex::new();
        index.insert(kernel(1, "/w/a"), PathConflict::Displace);
        index.insert(kernel(2, "/w/ab/"), PathConflict::Displace);
        index.rename_prefix("/w/a", "/v/q");
        assert_eq!(path_of(&index, 1), Some("/v/q"));
        assert_eq!(path_of(&index, 2), Some("/v/qb/"));
    }
}
