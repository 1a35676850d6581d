//! Keeping a recursive watch in step with the tree it covers.
//!
//! Directories created inside a recursively watched tree need watches of
//! their own, and a directory moved within the tree keeps its watches but
//! changes path. [`RecursiveFollower::observe`] does that bookkeeping for
//! one event at a time:
//!
//! * `CREATE` of a directory, or a `MOVED_TO` with no matching `MOVED_FROM`,
//!   watches the new subtree;
//! * `MOVED_FROM` of a watched directory is remembered;
//! * the following `MOVED_TO` renames every watch below the old path;
//! * any other event after a `MOVED_FROM` means the directory left the
//!   tree, and its watch is removed.
//!
//! Filesystem and mount wide fanotify marks already cover new directories,
//! so the follower does nothing for them.

use std::fs;

use crate::mask::EventMask;
use crate::registry::{Event, Registry, WatchId};

#[derive(Debug, Clone)]
pub struct RecursiveFollower {
    mask: EventMask,
    excludes: Vec<String>,
    moved_from: Option<String>,
}

impl RecursiveFollower {
    /// `mask` and `excludes` are used for watches on new directories.
    pub fn new<I, S>(mask: EventMask, excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mask,
            excludes: excludes.into_iter().map(Into::into).collect(),
            moved_from: None,
        }
    }

    /// Directory moved away whose destination has not been seen yet.
    pub fn pending_move(&self) -> Option<&str> {
        self.moved_from.as_deref()
    }

    /// Updates `registry` for `event`. Returns the id of a newly watched
    /// directory, if any.
    ///
    /// Failures are logged rather than returned so one unreadable directory
    /// does not stop the caller's event loop.
    pub fn observe(&mut self, registry: &mut Registry, event: &Event) -> Option<WatchId> {
        if registry.scope().is_wide() && registry.backend().is_fanotify() {
            return None;
        }

        if !event.mask.contains(EventMask::MOVED_TO) {
            if let Some(gone) = self.moved_from.take() {
                log::debug!("{gone} moved out of the watched tree");
                if let Err(err) = registry.unwatch_by_path(&gone) {
                    log::warn!("Error removing watch on {gone}: {err}");
                }
            }
        }

        if event.mask.contains(EventMask::CREATE)
            || (self.moved_from.is_none() && event.mask.contains(EventMask::MOVED_TO))
        {
            let new_dir = registry.dir_path_for_event(event)?;
            if !is_real_dir(&new_dir) {
                return None;
            }
            log::info!("Watching new directory {new_dir}");
            return match registry.watch_recursive(&new_dir, self.mask, &self.excludes) {
                Ok(id) => Some(id),
                Err(err) => {
                    log::warn!("Couldn't watch new directory {new_dir}: {err}");
                    None
                }
            };
        }

        if event.mask.contains(EventMask::MOVED_FROM) {
            self.moved_from = registry
                .dir_path_for_event(event)
                .filter(|path| registry.id_for_path(path).is_some());
        } else if event.mask.contains(EventMask::MOVED_TO) {
            if let Some(old) = self.moved_from.take() {
                if let Some(new) = registry.dir_path_for_event(event) {
                    log::debug!("directory moved from {old} to {new}");
                    registry.rename_prefix(&old, &new);
                }
            }
        }
        None
    }
}

fn is_real_dir(path: &str) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.is_dir())
}
