//! Watch records and the events handed to callers.

use std::fmt;
use std::os::fd::OwnedFd;

use super::object_id::ObjectId;
use super::stats::EventCounters;
use crate::mask::EventMask;

/// Identifier a caller sees for a watch.
///
/// For inotify this is the kernel watch descriptor. For fanotify it is a
/// sequential number the registry assigns when it first learns of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub i32);

impl WatchId {
    /// Events the registry could not attribute to any watch.
    pub const UNKNOWN: WatchId = WatchId(0);
    /// The synthetic watch of a fanotify queue overflow event.
    pub const OVERFLOW: WatchId = WatchId(-1);

    pub fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the kernel names the watched object in its records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKey {
    /// inotify watch descriptor.
    Kernel(i32),
    /// fanotify file handle, with the child name for entry events.
    Object(ObjectId),
}

impl WatchKey {
    pub fn object(&self) -> Option<&ObjectId> {
        match self {
            WatchKey::Object(id) => Some(id),
            WatchKey::Kernel(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct WatchRecord {
    pub id: WatchId,
    pub key: WatchKey,
    /// Path the watch was established on. Directories end in `/`.
    pub path: String,
    /// Interest mask used at registration.
    pub mask: EventMask,
    /// `O_PATH` handle of a watched fanotify directory.
    pub dir_handle: Option<OwnedFd>,
    /// Set when a fanotify mark was placed for this record, as opposed to a
    /// record created lazily for an object seen in an event.
    pub marked: bool,
    pub counters: EventCounters,
}

impl WatchRecord {
    pub fn new(id: WatchId, key: WatchKey, path: String, mask: EventMask) -> Self {
        Self {
            id,
            key,
            path,
            mask,
            dir_handle: None,
            marked: false,
            counters: EventCounters::default(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }
}

/// Open directory on a marked filesystem, passed as `mount_fd` when opening
/// file handles reported from that filesystem.
#[derive(Debug)]
pub struct MountMarker {
    pub path: String,
    pub handle: OwnedFd,
}

/// One normalized event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub wd: WatchId,
    pub mask: EventMask,
    /// Pairs `MOVED_FROM` with its `MOVED_TO`; zero otherwise.
    pub cookie: u32,
    /// Entry name relative to the watched directory.
    pub name: Option<String>,
}

impl Event {
    pub fn name_len(&self) -> usize {
        self.name.as_ref().map_or(0, String::len)
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self {
            wd: WatchId::UNKNOWN,
            mask: EventMask::empty(),
            cookie: 0,
            name: None,
        }
    }
}
