//! Thin wrappers over the Linux notification syscalls.
//!
//! Everything in here speaks raw kernel vocabulary (watch descriptors, mark
//! flags, file handles, record bytes). The registry layers paths and records
//! on top.

pub mod fanotify;
pub mod handle;
pub mod inotify;
pub mod source;

use std::ffi::CString;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

pub use fanotify::Fanotify;
pub use inotify::Inotify;
pub use source::EventSource;

/// The kernel notification group a registry reads from.
#[derive(Debug)]
pub enum Backend {
    Inotify(Inotify),
    Fanotify(Fanotify),
}

impl Backend {
    pub fn is_fanotify(&self) -> bool {
        matches!(self, Backend::Fanotify(_))
    }
}

impl AsFd for Backend {
    fn as_fd(&self) -> BorrowedFd<'_> {
        match self {
            Backend::Inotify(inotify) => inotify.as_fd(),
            Backend::Fanotify(fanotify) => fanotify.as_fd(),
        }
    }
}

/// Converts a `-1` syscall return into the thread's `errno`.
#[inline]
pub(crate) fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

pub(crate) fn path_to_cstring(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))
}
