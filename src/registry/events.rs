//! Turning kernel records into events.

use std::io;
use std::mem;
use std::os::fd::{AsFd, FromRawFd, OwnedFd};

use super::index::PathConflict;
use super::object_id::ObjectId;
use super::record::{Event, WatchId, WatchKey, WatchRecord};
use super::Registry;
use crate::config::MarkScope;
use crate::error::{NotifyError, Result};
use crate::kernel::handle;
use crate::kernel::{fanotify, inotify, EventSource};
use crate::mask::EventMask;
use crate::reader::{EventReader, RecordLayout, Timeout, MAX_EVENTS};

impl Registry {
    /// Waits for the next event.
    pub fn next_event(&mut self, timeout: Timeout) -> Result<Option<&Event>> {
        self.next_events(timeout, 1)
    }

    /// Waits for the next event, letting up to `batch_hint` minimum size
    /// records queue in the kernel before reading.
    ///
    /// Larger hints let the kernel merge repeated events, so counts can
    /// differ from reading one at a time. Events from this process, events
    /// the registry cannot attribute and events the filter rejects are
    /// skipped; `timeout` starts over after each skipped event. `Ok(None)`
    /// means the timeout elapsed or `batch_hint` is zero.
    ///
    /// The returned event lives until the next call.
    pub fn next_events(&mut self, timeout: Timeout, batch_hint: usize) -> Result<Option<&Event>> {
        self.next_events_with(batch_hint, |registry, hint| {
            copy_next_record(
                &mut registry.reader,
                &mut registry.kernel,
                timeout,
                hint,
                &mut registry.record,
            )
        })
    }

    /// The event loop behind [`Registry::next_events`]. `fetch` leaves the
    /// next raw record in `self.record`, or returns `false` on timeout.
    pub(super) fn next_events_with<F>(
        &mut self,
        batch_hint: usize,
        mut fetch: F,
    ) -> Result<Option<&Event>>
    where
        F: FnMut(&mut Self, usize) -> Result<bool>,
    {
        if batch_hint == 0 {
            return Ok(None);
        }
        let batch_hint = batch_hint.min(MAX_EVENTS);

        loop {
            if !fetch(self, batch_hint)? {
                return Ok(None);
            }

            let pid = match self.layout {
                RecordLayout::Inotify => {
                    self.decode_inotify();
                    0
                }
                RecordLayout::Fanotify => {
                    let record = mem::take(&mut self.record);
                    let decoded = self.decode_fanotify(&record);
                    self.record = record;
                    decoded?
                }
            };

            if self.discards(pid) {
                continue;
            }
            self.record_stats();
            return Ok(Some(&self.event));
        }
    }

    fn decode_inotify(&mut self) {
        let record = inotify::parse_record(&self.record);
        self.event = Event {
            wd: WatchId(record.wd),
            mask: EventMask::from_raw(record.mask),
            cookie: record.cookie,
            name: lossy_name(record.name),
        };
    }

    /// Decodes one fanotify record into `self.event`, returning the pid that
    /// caused it.
    pub(super) fn decode_fanotify(&mut self, buf: &[u8]) -> Result<i32> {
        let record = fanotify::parse_record(buf)?;
        if record.fd >= 0 {
            // SAFETY: a descriptor in the metadata was opened for us by the
            // kernel and is owned by nothing else.
            drop(unsafe { OwnedFd::from_raw_fd(record.fd) });
        }
        let mask = EventMask::from_raw(record.mask as u32);

        let Some(info) = record.info else {
            if mask.contains(EventMask::Q_OVERFLOW) {
                self.event = Event {
                    wd: WatchId::OVERFLOW,
                    mask,
                    ..Event::default()
                };
                return Ok(0);
            }
            return Err(NotifyError::MissingObjectId);
        };

        let name = lossy_name(info.name.unwrap_or_default());
        if self.verbose > 1 {
            log::trace!(
                "fanotify event: event_len={}, mask={:#x}, pid={}, name={}",
                buf.len(),
                record.mask,
                record.pid,
                name.as_deref().unwrap_or_default()
            );
        }
        if record.pid == self.pid {
            self.event = Event {
                mask,
                name,
                ..Event::default()
            };
            return Ok(record.pid);
        }

        let object = ObjectId::from_info(&info);
        let wd = match self.index.find_by_object(&object) {
            Some(slot) => self
                .index
                .get(slot)
                .map_or(WatchId::UNKNOWN, |record| record.id),
            None => self.adopt_object(object),
        };
        self.event = Event {
            wd,
            mask,
            cookie: 0,
            name,
        };
        Ok(record.pid)
    }

    /// Creates a record for an object first seen in an event, named by the
    /// path it resolves to. Objects whose path cannot be found map to
    /// [`WatchId::UNKNOWN`].
    fn adopt_object(&mut self, object: ObjectId) -> WatchId {
        let path = match self.resolve_object(&object) {
            Ok(Some(path)) if path.is_empty() => return WatchId::UNKNOWN,
            Ok(Some(path)) => path,
            Ok(None) => {
                if self.verbose > 0 {
                    log::info!("[{object:?}]");
                }
                return WatchId::UNKNOWN;
            }
            Err(err) => {
                log::warn!("{err}");
                if self.verbose > 0 {
                    log::info!("[{object:?}]");
                }
                return WatchId::UNKNOWN;
            }
        };
        if self.verbose > 0 {
            log::info!("[{object:?}] {path}");
        }

        let id = self.next_object_id();
        let record = WatchRecord::new(id, WatchKey::Object(object), path, EventMask::empty());
        let inserted = self.index.insert(record, PathConflict::Keep);
        log::debug!("tracking object as watch {id}");
        self.index
            .get(inserted.slot)
            .map_or(WatchId::UNKNOWN, |record| record.id)
    }

    /// Finds the current path of `object`.
    ///
    /// `Ok(Some(""))` marks an object that should be skipped: it sits in a
    /// deleted directory, or outside the part of the filesystem this process
    /// can reach. `Ok(None)` means no path could be found but the stored one
    /// may still serve.
    pub(super) fn resolve_object(&self, object: &ObjectId) -> Result<Option<String>> {
        let mount = self
            .markers
            .get(&object.fsid())
            .map(|marker| marker.handle.as_fd());

        let dir = match self.resolver.open_dir(mount, &object.file_handle()) {
            Ok(dir) => dir,
            Err(err) if self.scope == MarkScope::Filesystem => {
                if err.raw_os_error() == Some(libc::ESTALE) {
                    return Ok(Some(String::new()));
                }
                return Err(NotifyError::ResolvePath(err));
            }
            Err(_) if object.name().is_some() => self.parent_handle(object)?,
            Err(_) => return Ok(None),
        };

        let resolved = self
            .resolver
            .resolve(dir.as_fd())
            .map_err(NotifyError::ResolvePath)?;
        let mut path = resolved
            .into_os_string()
            .into_string()
            .unwrap_or_else(|raw| raw.to_string_lossy().into_owned());
        if path == "/" {
            return Ok(Some(String::new()));
        }
        path.push('/');

        if let Some(name) = object.name() {
            let exists = handle::exists_at(dir.as_fd(), name).map_err(NotifyError::ResolvePath)?;
            path.push_str(&String::from_utf8_lossy(name));
            if !exists {
                path.push_str(" (deleted)");
            }
        }
        Ok(Some(path))
    }

    /// A fresh descriptor for the watched directory an entry event names.
    fn parent_handle(&self, object: &ObjectId) -> Result<OwnedFd> {
        let parent = self
            .index
            .find_by_object(&object.without_name())
            .and_then(|slot| self.index.get(slot))
            .ok_or_else(|| {
                NotifyError::ResolvePath(io::Error::new(
                    io::ErrorKind::NotFound,
                    "no watch for the directory of this entry",
                ))
            })?;
        let handle = parent.dir_handle.as_ref().ok_or_else(|| {
            NotifyError::ResolvePath(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no directory handle for {}", parent.path),
            ))
        })?;
        handle.try_clone().map_err(NotifyError::ResolvePath)
    }

    pub(super) fn discards(&self, pid: i32) -> bool {
        if pid != 0 && pid == self.pid {
            return true;
        }
        if pid != 0 && self.event.wd == WatchId::UNKNOWN {
            return true;
        }
        if self.event.mask.contains(EventMask::Q_OVERFLOW) {
            return false;
        }
        let Some(filter) = &self.filter else {
            return false;
        };
        let (path, dirlen) = self.path_and_dirlen_for_event(&self.event);
        let fields = Self::fields(&self.event, &path, dirlen);
        let composed = format!("{}{}", fields.dir, fields.name);
        filter.rejects(&composed, self.event.mask)
    }
}

/// Reads the next complete record from `source` into `record`.
pub(super) fn copy_next_record<S>(
    reader: &mut EventReader,
    source: &mut S,
    timeout: Timeout,
    batch_hint: usize,
    record: &mut Vec<u8>,
) -> Result<bool>
where
    S: EventSource + ?Sized,
{
    let Some(raw) = reader.next_record(source, timeout, batch_hint)? else {
        return Ok(false);
    };
    record.clear();
    record.extend_from_slice(raw);
    Ok(true)
}

fn lossy_name(raw: &[u8]) -> Option<String> {
    (!raw.is_empty()).then(|| String::from_utf8_lossy(raw).into_owned())
}
