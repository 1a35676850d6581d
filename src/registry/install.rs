//! Placing and removing kernel watches.

use std::fs;
use std::io;
use std::path::Path;

use super::index::PathConflict;
use super::object_id::ObjectId;
use super::record::{MountMarker, WatchId, WatchKey, WatchRecord};
use super::Registry;
use crate::error::{NotifyError, Result};
use crate::kernel::fanotify::{
    FAN_EVENT_ON_CHILD, FAN_MARK_ADD, FAN_MARK_DONT_FOLLOW, FAN_MARK_REMOVE,
};
use crate::kernel::handle::{self, FileHandle};
use crate::kernel::{Backend, Fanotify};
use crate::mask::EventMask;

impl Registry {
    /// Watches a single file or directory.
    ///
    /// Watching an inode that is already watched updates that watch and
    /// returns its id.
    pub fn watch(&mut self, path: &str, mask: EventMask) -> Result<WatchId> {
        let is_dir = is_real_dir(Path::new(path));
        let stored = if is_dir && !path.ends_with('/') {
            format!("{path}/")
        } else {
            path.to_string()
        };

        let record = match &self.kernel {
            Backend::Inotify(inotify) => {
                let wd = inotify
                    .add_watch(Path::new(path), mask)
                    .map_err(|source| NotifyError::Watch {
                        path: path.into(),
                        source,
                    })?;
                WatchRecord::new(WatchId(wd), WatchKey::Kernel(wd), stored, mask)
            }
            Backend::Fanotify(fanotify) => {
                let (mask, flags) =
                    place_mark(fanotify, self.scope.mark_flags(), Path::new(path), mask)?;
                let built = self.object_record(path, stored, mask, is_dir);
                undo_on_error(built, || match &self.kernel {
                    Backend::Fanotify(fanotify) => {
                        remove_mark(fanotify, flags, mask, Path::new(path))
                    }
                    Backend::Inotify(_) => Ok(()),
                })?
            }
        };

        let inserted = self.index.insert(record, PathConflict::Displace);
        self.drop_displaced(inserted.displaced);
        let id = self
            .index
            .get(inserted.slot)
            .map_or(WatchId::UNKNOWN, |record| record.id);
        log::debug!("watching {path} as {id}");
        Ok(id)
    }

    /// Watches each path in turn. Stops at the first failure; watches placed
    /// before it stay in place.
    pub fn watch_many<S>(&mut self, paths: &[S], mask: EventMask) -> Result<Vec<WatchId>>
    where
        S: AsRef<str>,
    {
        paths
            .iter()
            .map(|path| self.watch(path.as_ref(), mask))
            .collect()
    }

    /// Removes the watch `id`. Unknown ids are not an error.
    pub fn unwatch_by_id(&mut self, id: WatchId) -> Result<()> {
        let Some(slot) = self.index.find_by_id(id) else {
            return Ok(());
        };
        if let Some(record) = self.index.get(slot) {
            self.release(record)?;
        }
        self.index.remove(slot);
        log::debug!("removed watch {id}");
        Ok(())
    }

    /// Removes the watch established on `path`. Unknown paths are not an
    /// error.
    pub fn unwatch_by_path(&mut self, path: &str) -> Result<()> {
        match self.id_for_path(path) {
            Some(id) => self.unwatch_by_id(id),
            None => Ok(()),
        }
    }

    /// Removes the kernel side of `record`.
    ///
    /// The kernel drops inotify watches on its own when the inode goes away,
    /// so `EINVAL` counts as already removed. Records created lazily for
    /// fanotify objects never had a mark of their own.
    pub(super) fn release(&self, record: &WatchRecord) -> Result<()> {
        let result = match (&self.kernel, &record.key) {
            (Backend::Inotify(inotify), WatchKey::Kernel(wd)) => {
                already_gone(inotify.rm_watch(*wd), libc::EINVAL)
            }
            (Backend::Fanotify(fanotify), WatchKey::Object(_)) if record.marked => {
                let path = record.path.trim_end_matches('/');
                let path = if path.is_empty() { "/" } else { path };
                remove_mark(fanotify, self.scope.mark_flags(), record.mask, Path::new(path))
            }
            _ => Ok(()),
        };
        result.map_err(|source| NotifyError::Unwatch {
            id: record.id.get(),
            source,
        })
    }

    /// Builds the record naming the object a fanotify mark was just placed
    /// on, creating the mount marker for its filesystem on first use.
    fn object_record(
        &mut self,
        path: &str,
        stored: String,
        mask: EventMask,
        is_dir: bool,
    ) -> Result<WatchRecord> {
        let target = Path::new(path);
        let stat = handle::statfs(target).map_err(|source| NotifyError::Stat {
            path: target.into(),
            source,
        })?;
        let fsid = if stat.is_btrfs {
            stat.fsid.narrowed()
        } else {
            stat.fsid
        };

        if is_dir && !self.markers.contains_key(&fsid) {
            let mount = handle::open_dir(Path::new(&stored)).map_err(|source| {
                NotifyError::Open {
                    path: stored.clone().into(),
                    source,
                }
            })?;
            let marker_path = stored.strip_suffix('/').unwrap_or(&stored).to_string();
            log::debug!("mount marker for {fsid:?} at {marker_path}");
            self.markers.insert(
                fsid,
                MountMarker {
                    path: marker_path,
                    handle: mount,
                },
            );
        }

        let file_handle = self.encode_handle(target)?;
        let object = ObjectId::for_mark(fsid, &file_handle, is_dir);
        let dir_handle = if is_dir {
            let fd = handle::open_path_dir(Path::new(&stored)).map_err(|source| {
                NotifyError::Open {
                    path: stored.clone().into(),
                    source,
                }
            })?;
            Some(fd)
        } else {
            None
        };

        let id = self.next_object_id();
        let mut record = WatchRecord::new(id, WatchKey::Object(object), stored, mask);
        record.dir_handle = dir_handle;
        record.marked = true;
        Ok(record)
    }

    fn encode_handle(&mut self, path: &Path) -> Result<FileHandle> {
        encode_with_fallback(&mut self.handle_flags, path, handle::name_to_handle_at)
    }
}

/// Encodes a handle for `path`, retrying without flags once when the kernel
/// rejects them with `EINVAL` (kernels before 6.5 do not know
/// `AT_HANDLE_FID`). The cleared flags stick for later calls.
fn encode_with_fallback<F>(
    flags: &mut libc::c_int,
    path: &Path,
    mut encode: F,
) -> Result<FileHandle>
where
    F: FnMut(&Path, libc::c_int) -> io::Result<FileHandle>,
{
    let encoded = match encode(path, *flags) {
        Err(err) if *flags != 0 && err.raw_os_error() == Some(libc::EINVAL) => {
            log::debug!("handle flags {:#x} rejected, retrying without", *flags);
            *flags = 0;
            encode(path, 0)
        }
        other => other,
    };
    encoded.map_err(|source| NotifyError::EncodeHandle {
        path: path.into(),
        source,
    })
}

/// Adds a fanotify mark on `target`. `DONT_FOLLOW` in `mask` becomes a mark
/// flag; returns the mask without it and the flags that select the mark.
fn place_mark(
    fanotify: &Fanotify,
    scope_flags: libc::c_uint,
    target: &Path,
    mut mask: EventMask,
) -> Result<(EventMask, libc::c_uint)> {
    let mut flags = scope_flags;
    if mask.contains(EventMask::DONT_FOLLOW) {
        mask.remove(EventMask::DONT_FOLLOW);
        flags |= FAN_MARK_DONT_FOLLOW;
    }
    fanotify
        .mark(
            FAN_MARK_ADD | flags,
            u64::from(mask.bits()) | FAN_EVENT_ON_CHILD,
            target,
        )
        .map_err(|source| NotifyError::Watch {
            path: target.into(),
            source,
        })?;
    Ok((mask, flags))
}

/// Removes the mark placed on `target`. A mark that is already gone is not
/// an error.
fn remove_mark(
    fanotify: &Fanotify,
    flags: libc::c_uint,
    mask: EventMask,
    target: &Path,
) -> io::Result<()> {
    let removed = fanotify.mark(
        FAN_MARK_REMOVE | flags,
        u64::from(mask.bits()) | FAN_EVENT_ON_CHILD,
        target,
    );
    already_gone(removed, libc::ENOENT)
}

/// Treats `errno` as the kernel reporting the watch or mark was already
/// removed.
fn already_gone(result: io::Result<()>, errno: libc::c_int) -> io::Result<()> {
    match result {
        Err(err) if err.raw_os_error() == Some(errno) => Ok(()),
        other => other,
    }
}

/// Runs `undo` when `result` failed, logging rather than returning an undo
/// failure so the original error reaches the caller.
fn undo_on_error<T, F>(result: Result<T>, undo: F) -> Result<T>
where
    F: FnOnce() -> io::Result<()>,
{
    if result.is_err() {
        if let Err(err) = undo() {
            log::warn!("could not remove mark after failed watch: {err}");
        }
    }
    result
}

/// `lstat` based: a symlink to a directory is not a directory here.
pub(super) fn is_real_dir(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(meta) => meta.is_dir(),
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                log::debug!("stat failed on {}: {err}", path.display());
            }
            false
        }
    }
}
