//! The watch registry.
//!
//! A [`Registry`] owns one kernel notification group (inotify or fanotify),
//! the records of everything watched through it, and the reader that turns
//! kernel records into [`Event`]s tagged with watch ids. Paths for an event
//! come from the record its id names.
//!
//! ```no_run
//! use notifytools::{EventMask, Registry, Timeout};
//!
//! let mut registry = Registry::init_inotify()?;
//! registry.watch_recursive("/srv/data", EventMask::ALL_EVENTS, &[] as &[&str])?;
//! while let Some(event) = registry.next_event(Timeout::BlockForever)?.cloned() {
//!     println!("{}", registry.format_event(&event, "%w%f %e")?);
//! }
//! # Ok::<(), notifytools::NotifyError>(())
//! ```

mod events;
mod index;
mod install;
mod object_id;
mod record;
mod recursive;
mod stats;


use std::borrow::Cow;

use fnv::FnvHashMap;

use crate::config::{BackendKind, MarkScope, NotifyConfig};
use crate::error::{NotifyError, Result};
use crate::filter::{EventFilter, FilterFlags, FilterSense};
use crate::format::{EventFields, Formatter};
use crate::kernel::handle::{Fsid, AT_HANDLE_FID};
use crate::kernel::{Backend, Fanotify, Inotify};
use crate::mask::EventMask;
use crate::reader::{EventReader, RecordLayout};
use crate::resolve::{PathResolver, ProcFdResolver};

pub use index::{Inserted, PathConflict, WatchIndex};
pub use object_id::ObjectId;
pub use record::{Event, MountMarker, WatchId, WatchKey, WatchRecord};
pub use stats::{EventCounters, SortOrder, StatKind};

pub struct Registry {
    kernel: Backend,
    reader: EventReader,
    layout: RecordLayout,
    index: WatchIndex,
    markers: FnvHashMap<Fsid, MountMarker>,
    scope: MarkScope,
    resolver: Box<dyn PathResolver>,
    filter: Option<EventFilter>,
    formatter: Formatter,
    /// Global counters; `None` while statistics are off.
    totals: Option<EventCounters>,
    /// Flags for `name_to_handle_at`. `AT_HANDLE_FID` is dropped for good
    /// once the kernel rejects it.
    handle_flags: libc::c_int,
    last_object_id: i32,
    pid: i32,
    verbose: u8,
    /// Copy of the record being decoded.
    record: Vec<u8>,
    event: Event,
}

impl Registry {
    pub fn init(config: NotifyConfig) -> Result<Self> {
        let (kernel, layout) = match config.backend {
            BackendKind::Inotify => {
                let inotify = Inotify::init().map_err(|source| NotifyError::Init {
                    backend: "inotify",
                    source,
                })?;
                (Backend::Inotify(inotify), RecordLayout::Inotify)
            }
            BackendKind::Fanotify => {
                let fanotify = Fanotify::init().map_err(|source| NotifyError::Init {
                    backend: "fanotify",
                    source,
                })?;
                (Backend::Fanotify(fanotify), RecordLayout::Fanotify)
            }
        };
        let handle_flags = match config.scope {
            MarkScope::Inode => AT_HANDLE_FID,
            MarkScope::Filesystem | MarkScope::Mount => 0,
        };
        log::debug!(
            "initialized {:?} registry (scope {:?})",
            config.backend,
            config.scope
        );

        let mut registry = Self {
            kernel,
            reader: EventReader::new(layout),
            layout,
            index: WatchIndex::new(),
            markers: FnvHashMap::default(),
            scope: config.scope,
            resolver: Box::new(ProcFdResolver),
            filter: None,
            formatter: Formatter::new(),
            totals: None,
            handle_flags,
            last_object_id: 0,
            pid: std::process::id() as i32,
            verbose: config.verbose,
            record: Vec::new(),
            event: Event::default(),
        };
        if config.stats {
            registry.init_stats();
        }
        Ok(registry)
    }

    pub fn init_inotify() -> Result<Self> {
        Self::init(NotifyConfig::inotify())
    }

    /// Replaces how open directory handles are mapped back to paths.
    pub fn with_resolver<R>(mut self, resolver: R) -> Self
    where
        R: PathResolver + 'static,
    {
        self.resolver = Box::new(resolver);
        self
    }

    /// Drops every record and closes the kernel group.
    pub fn shutdown(mut self) {
        self.index.clear();
        self.markers.clear();
        log::debug!("registry shut down");
    }

    pub fn backend(&self) -> BackendKind {
        match self.kernel {
            Backend::Inotify(_) => BackendKind::Inotify,
            Backend::Fanotify(_) => BackendKind::Fanotify,
        }
    }

    pub fn scope(&self) -> MarkScope {
        self.scope
    }

    pub fn num_watches(&self) -> usize {
        self.index.len()
    }

    fn is_fanotify(&self) -> bool {
        self.kernel.is_fanotify()
    }

    fn next_object_id(&mut self) -> WatchId {
        self.last_object_id = self.last_object_id.wrapping_add(1).max(1);
        WatchId(self.last_object_id)
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    /// Path of the watch `id`, directories ending in `/`.
    ///
    /// With a filesystem or mount wide fanotify mark the path is resolved
    /// again from the object identifier, so it follows renames the registry
    /// never saw. The stored path is the fallback.
    pub fn path_for_id(&self, id: WatchId) -> Option<Cow<'_, str>> {
        let record = self.index.record_by_id(id)?;
        if self.scope.is_wide() {
            if let Some(object) = record.key.object() {
                match self.resolve_object(object) {
                    Ok(Some(path)) if !path.is_empty() => return Some(Cow::Owned(path)),
                    Ok(_) => {}
                    Err(err) => log::debug!("live path for watch {id}: {err}"),
                }
            }
        }
        Some(Cow::Borrowed(record.path.as_str()))
    }

    /// Id of the watch established on `path`. A directory may be named with
    /// or without its trailing `/`.
    pub fn id_for_path(&self, path: &str) -> Option<WatchId> {
        let slot = self.find_path(path)?;
        self.index.get(slot).map(|record| record.id)
    }

    /// The path of `event`'s watch and the length of its directory part.
    ///
    /// For inotify the whole watch path is the directory. fanotify records
    /// created for an entry carry the entry name in their path, which is
    /// split off at the last `/`. Unknown watches yield `("", 0)`.
    pub fn path_and_dirlen_for_event(&self, event: &Event) -> (Cow<'_, str>, usize) {
        if event.wd == WatchId::UNKNOWN {
            return (Cow::Borrowed(""), 0);
        }
        let Some(path) = self.path_for_id(event.wd) else {
            return (Cow::Borrowed(""), 0);
        };
        let dirlen = if self.is_fanotify() {
            path.rfind('/').map_or(path.len(), |sep| sep + 1)
        } else {
            path.len()
        };
        (path, dirlen)
    }

    /// The path of the directory an `ISDIR` event is about, with a trailing
    /// `/`. `None` for events on non-directories or unknown watches.
    pub fn dir_path_for_event(&self, event: &Event) -> Option<String> {
        if !event.mask.contains(EventMask::ISDIR) {
            return None;
        }
        let path = self.path_for_id(event.wd)?;
        if path.is_empty() {
            return None;
        }
        let name = if self.is_fanotify() { "" } else { event.name() };
        Some(format!("{path}{name}/"))
    }

    fn find_path(&self, path: &str) -> Option<crate::storage::SlabIndex> {
        self.index.find_by_path(path).or_else(|| {
            if path.ends_with('/') {
                None
            } else {
                self.index.find_by_path(&format!("{path}/"))
            }
        })
    }

    // -----------------------------------------------------------------------
    // Rename bookkeeping
    // -----------------------------------------------------------------------

    /// Points the watch established on `old` at `new`.
    ///
    /// A directory may be named without its trailing `/`, in which case
    /// `new` gets one as well.
    pub fn rename(&mut self, old: &str, new: &str) {
        let displaced = if self.index.find_by_path(old).is_none()
            && !old.ends_with('/')
            && !new.is_empty()
        {
            let new = if new.ends_with('/') {
                new.to_string()
            } else {
                format!("{new}/")
            };
            self.index.rename(&format!("{old}/"), &new)
        } else {
            self.index.rename(old, new)
        };
        self.drop_displaced(displaced);
    }

    pub fn set_path_for_id(&mut self, id: WatchId, path: &str) {
        if path.is_empty() {
            return;
        }
        let Some(slot) = self.index.find_by_id(id) else {
            return;
        };
        let displaced = self.index.set_path(slot, path.to_string());
        self.drop_displaced(displaced);
    }

    /// Rewrites every watch path starting with `old_prefix`, as after the
    /// directory `old_prefix` was moved to `new_prefix`.
    pub fn rename_prefix(&mut self, old_prefix: &str, new_prefix: &str) {
        let displaced = self.index.rename_prefix(old_prefix, new_prefix);
        self.drop_displaced(displaced);
    }

    fn drop_displaced(&mut self, displaced: impl IntoIterator<Item = WatchRecord>) {
        for record in displaced {
            log::warn!(
                "watch {} on {} replaced by a renamed watch",
                record.id,
                record.path
            );
            if let Err(err) = self.release(&record) {
                log::warn!("{err}");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Filtering and formatting
    // -----------------------------------------------------------------------

    /// Installs a path filter, or removes it with `None`.
    ///
    /// The previous filter is gone even when `pattern` fails to compile.
    pub fn set_filter(
        &mut self,
        pattern: Option<&str>,
        flags: FilterFlags,
        sense: FilterSense,
        recursive_aware: bool,
    ) -> Result<()> {
        self.filter = None;
        if let Some(pattern) = pattern {
            self.filter = Some(EventFilter::new(pattern, flags, sense, recursive_aware)?);
        }
        Ok(())
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    pub fn filter(&self) -> Option<&EventFilter> {
        self.filter.as_ref()
    }

    /// Renders `event` through `template`. See [`crate::format`] for the
    /// directives.
    pub fn format_event(&self, event: &Event, template: &str) -> Result<String> {
        let (path, dirlen) = self.path_and_dirlen_for_event(event);
        let fields = Self::fields(event, &path, dirlen);
        self.formatter.render(template, &fields)
    }

    fn fields<'a>(event: &'a Event, path: &'a str, dirlen: usize) -> EventFields<'a> {
        let (dir, rest) = path.split_at(dirlen.min(path.len()));
        EventFields {
            dir,
            name: if rest.is_empty() { event.name() } else { rest },
            mask: event.mask,
            cookie: event.cookie,
        }
    }

    pub fn set_time_format(&mut self, pattern: &str) -> Result<()> {
        self.formatter.set_time_format(Some(pattern))
    }

    pub fn clear_time_format(&mut self) {
        // clearing cannot fail validation
        let _ = self.formatter.set_time_format(None);
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    /// Zeroes every counter and starts counting.
    pub fn init_stats(&mut self) {
        for record in self.index.iter_mut() {
            record.counters.reset();
        }
        self.totals = Some(EventCounters::default());
    }

    pub fn stats_enabled(&self) -> bool {
        self.totals.is_some()
    }

    pub fn stat_for_id(&self, id: WatchId, kind: StatKind) -> Option<u32> {
        self.totals.as_ref()?;
        self.index
            .record_by_id(id)
            .map(|record| record.counters.get(kind))
    }

    pub fn stat_for_path(&self, path: &str, kind: StatKind) -> Option<u32> {
        self.totals.as_ref()?;
        let slot = self.find_path(path)?;
        self.index.get(slot).map(|record| record.counters.get(kind))
    }

    pub fn stat_total(&self, kind: StatKind) -> Option<u32> {
        self.totals.as_ref().map(|totals| totals.get(kind))
    }

    /// Watch ids ordered by one counter, ties by ascending id.
    pub fn watches_sorted_by(&self, kind: StatKind, order: SortOrder) -> Vec<WatchId> {
        let mut rows: Vec<(i32, &EventCounters)> = self
            .index
            .iter()
            .map(|record| (record.id.get(), &record.counters))
            .collect();
        rows.sort_by(|a, b| stats::compare_by(kind, order, *a, *b));
        rows.into_iter().map(|(id, _)| WatchId(id)).collect()
    }

    fn record_stats(&mut self) {
        let Some(totals) = self.totals.as_mut() else {
            return;
        };
        let Some(record) = self.index.record_by_id_mut(self.event.wd) else {
            return;
        };
        record.counters.record(self.event.mask);
        totals.record(self.event.mask);
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backend", &self.backend())
            .field("scope", &self.scope)
            .field("watches", &self.index.len())
            .field("filter", &self.filter.as_ref().map(EventFilter::as_str))
            .field("stats", &self.totals.is_some())
            .finish_non_exhaustive()
    }
}
