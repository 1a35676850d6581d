//! Per-watch and global event counters.

use std::cmp::Ordering;

use crate::mask::EventMask;

/// Counter slots. `Total` counts every recorded event once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    Total,
    Access,
    Modify,
    Attrib,
    CloseWrite,
    CloseNowrite,
    Open,
    MovedFrom,
    MovedTo,
    Create,
    Delete,
    DeleteSelf,
    Unmount,
    MoveSelf,
}

const KIND_COUNT: usize = 14;

const MASK_KINDS: [(EventMask, StatKind); KIND_COUNT - 1] = [
    (EventMask::ACCESS, StatKind::Access),
    (EventMask::MODIFY, StatKind::Modify),
    (EventMask::ATTRIB, StatKind::Attrib),
    (EventMask::CLOSE_WRITE, StatKind::CloseWrite),
    (EventMask::CLOSE_NOWRITE, StatKind::CloseNowrite),
    (EventMask::OPEN, StatKind::Open),
    (EventMask::MOVED_FROM, StatKind::MovedFrom),
    (EventMask::MOVED_TO, StatKind::MovedTo),
    (EventMask::CREATE, StatKind::Create),
    (EventMask::DELETE, StatKind::Delete),
    (EventMask::DELETE_SELF, StatKind::DeleteSelf),
    (EventMask::UNMOUNT, StatKind::Unmount),
    (EventMask::MOVE_SELF, StatKind::MoveSelf),
];

impl StatKind {
    /// The counter for a single event bit. `None` for masks that are empty,
    /// combine several kinds or name no counted kind.
    pub fn from_mask(mask: EventMask) -> Option<Self> {
        if mask.is_empty() {
            return Some(StatKind::Total);
        }
        MASK_KINDS
            .iter()
            .find(|(bit, _)| *bit == mask)
            .map(|(_, kind)| *kind)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventCounters([u32; KIND_COUNT]);

impl EventCounters {
    /// Counts `mask` once per kind bit it carries, plus once in the total.
    pub fn record(&mut self, mask: EventMask) {
        for (bit, kind) in MASK_KINDS {
            if mask.contains(bit) {
                self.bump(kind);
            }
        }
        self.bump(StatKind::Total);
    }

    pub fn get(&self, kind: StatKind) -> u32 {
        self.0[kind.slot()]
    }

    pub fn reset(&mut self) {
        self.0 = [0; KIND_COUNT];
    }

    fn bump(&mut self, kind: StatKind) {
        let slot = &mut self.0[kind.slot()];
        *slot = slot.wrapping_add(1);
    }
}

/// Orders `(id, counters)` pairs by one counter, ties broken by ascending id.
pub(crate) fn compare_by(
    kind: StatKind,
    order: SortOrder,
    a: (i32, &EventCounters),
    b: (i32, &EventCounters),
) -> Ordering {
    let by_count = a.1.get(kind).cmp(&b.1.get(kind));
    let by_count = match order {
        SortOrder::Ascending => by_count,
        SortOrder::Descending => by_count.reverse(),
    };
    by_count.then_with(|| a.0.cmp(&b.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_kind_and_total() {
        let mut counters = EventCounters::default();
        counters.record(EventMask::CLOSE_WRITE);
        counters.record(EventMask::CREATE | EventMask::ISDIR);
        counters.record(EventMask::CREATE);

        assert_eq!(counters.get(StatKind::CloseWrite), 1);
        assert_eq!(counters.get(StatKind::Create), 2);
        assert_eq!(counters.get(StatKind::Delete), 0);
        assert_eq!(counters.get(StatKind::Total), 3);

        counters.reset();
        assert_eq!(counters, EventCounters::default());
    }

    #[test]
    fn kind_from_single_bit_only() {
        assert_eq!(StatKind::from_mask(EventMask::MODIFY), Some(StatKind::Modify));
        assert_eq!(StatKind::from_mask(EventMask::empty()), Some(StatKind::Total));
        assert_eq!(StatKind::from_mask(EventMask::CLOSE), None);
        assert_eq!(StatKind::from_mask(EventMask::ISDIR), None);
    }

    #[test]
    fn sort_breaks_ties_by_id() {
        let mut busy = EventCounters::default();
        busy.record(EventMask::MODIFY);
        busy.record(EventMask::MODIFY);
        let mut quiet = EventCounters::default();
        quiet.record(EventMask::MODIFY);

        let mut rows = vec![(3, &quiet), (1, &busy), (2, &quiet)];
        rows.sort_by(|a, b| compare_by(StatKind::Modify, SortOrder::Descending, *a, *b));
        let ids: Vec<i32> = rows.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        rows.sort_by(|a, b| compare_by(StatKind::Modify, SortOrder::Ascending, *a, *b));
        let ids: Vec<i32> = rows.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
