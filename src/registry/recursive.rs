//! Watching whole directory trees.

use std::fs;
use std::io;

use super::record::WatchId;
use super::Registry;
use crate::error::{NotifyError, Result};
use crate::mask::EventMask;

impl Registry {
    /// Watches `root` and every directory below it, skipping directories
    /// named in `excludes` together with their subtrees.
    ///
    /// A file `root` is watched on its own. Subdirectories that vanish,
    /// cannot be read or loop are skipped; any other failure aborts, leaving
    /// the watches placed so far. Children are watched before their parent.
    /// Symlinked directories are not followed.
    ///
    /// Returns the id of the watch on `root`.
    pub fn watch_recursive<S>(
        &mut self,
        root: &str,
        mask: EventMask,
        excludes: &[S],
    ) -> Result<WatchId>
    where
        S: AsRef<str>,
    {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) if err.raw_os_error() == Some(libc::ENOTDIR) => {
                return self.watch(root, mask);
            }
            Err(source) => {
                return Err(NotifyError::ReadDir {
                    path: root.into(),
                    source,
                })
            }
        };
        let dir = if root.ends_with('/') {
            root.to_string()
        } else {
            format!("{root}/")
        };

        for entry in entries {
            let entry = entry.map_err(|source| NotifyError::ReadDir {
                path: dir.clone().into(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                log::warn!("skipping non UTF-8 entry {:?} in {dir}", name);
                continue;
            };
            let child = format!("{dir}{name}");

            let meta = match fs::symlink_metadata(&child) {
                Ok(meta) => meta,
                Err(err) if skippable_entry(&err) => {
                    log::debug!("skipping {child}: {err}");
                    continue;
                }
                Err(source) => {
                    return Err(NotifyError::Stat {
                        path: child.into(),
                        source,
                    })
                }
            };
            if !meta.is_dir() {
                continue;
            }
            if is_excluded(&child, excludes) {
                log::debug!("excluded {child}/");
                continue;
            }

            let child = format!("{child}/");
            if let Err(err) = self.watch_recursive(&child, mask, excludes) {
                match err.raw_os_error() {
                    Some(libc::EACCES | libc::ENOENT | libc::ELOOP) => {
                        log::debug!("skipping {child}: {err}");
                    }
                    _ => return Err(err),
                }
            }
        }

        self.watch(&dir, mask)
    }
}

/// Entries that vanish between listing and `lstat`, or that we may not
/// look at, are left out of the walk.
fn skippable_entry(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EACCES | libc::ENOENT))
}

/// Exclude entries name directories with or without a trailing `/`.
fn is_excluded<S: AsRef<str>>(dir: &str, excludes: &[S]) -> bool {
    excludes.iter().any(|exclude| {
        let exclude = exclude.as_ref();
        exclude.strip_suffix('/').unwrap_or(exclude) == dir
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_ignores_trailing_slash() {
        assert!(is_excluded("/w/a/c", &["/w/a/c/"]));
        assert!(is_excluded("/w/a/c", &["/w/a/c"]));
        assert!(!is_excluded("/w/a/cd", &["/w/a/c"]));
        assert!(!is_excluded("/w/a", &["/w/a/c"]));
        assert!(!is_excluded("/w/a", &[] as &[&str]));
    }

    #[test]
    fn vanished_and_forbidden_entries_are_skipped() {
        let err = |errno| io::Error::from_raw_os_error(errno);
        assert!(skippable_entry(&err(libc::ENOENT)));
        assert!(skippable_entry(&err(libc::EACCES)));
        assert!(!skippable_entry(&err(libc::EIO)));
        assert!(!skippable_entry(&io::Error::new(io::ErrorKind::Other, "x")));
    }
}
