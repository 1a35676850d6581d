//! Recovering a path from an open directory descriptor.

use std::fs;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd};
use std::path::PathBuf;

use crate::kernel::handle::{self, FileHandle};

/// Maps fanotify file handles back to the paths they currently live at.
pub trait PathResolver: Send {
    /// Path of an open directory.
    fn resolve(&self, dir: BorrowedFd<'_>) -> io::Result<PathBuf>;

    /// Opens the directory `handle` names on the filesystem of `mount`.
    fn open_dir(
        &self,
        mount: Option<BorrowedFd<'_>>,
        handle: &FileHandle,
    ) -> io::Result<OwnedFd> {
        handle::open_by_handle_at(mount, handle, libc::O_DIRECTORY)
    }
}

/// Reads the `/proc/self/fd/N` symlink.
///
/// When the directory is not reachable from this process's root (for
/// example outside the bind mount a filesystem mark was placed through) the
/// kernel reports just `/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcFdResolver;

impl PathResolver for ProcFdResolver {
    fn resolve(&self, dir: BorrowedFd<'_>) -> io::Result<PathBuf> {
        fs::read_link(format!("/proc/self/fd/{}", dir.as_raw_fd()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::handle::open_path_dir;
    use std::os::fd::AsFd;

    #[test]
    fn resolves_an_open_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fd = open_path_dir(dir.path()).expect("open");
        let resolved = ProcFdResolver.resolve(fd.as_fd()).expect("readlink");
        assert_eq!(resolved, dir.path().canonicalize().expect("canonicalize"));
    }

    #[test]
    fn follows_a_renamed_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let before = dir.path().join("before");
        let after = dir.path().join("after");
        fs::create_dir(&before).expect("mkdir");
        let fd = open_path_dir(&before).expect("open");
        fs::rename(&before, &after).expect("rename");
        let resolved = ProcFdResolver.resolve(fd.as_fd()).expect("readlink");
        assert_eq!(resolved, after.canonicalize().expect("canonicalize"));
    }
}
