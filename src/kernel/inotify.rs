//! inotify descriptor and record framing.
//!
//! An inotify record is a fixed 16 byte header followed by `len` bytes of
//! NUL padded name:
//!
//! ```text
//! i32 wd | u32 mask | u32 cookie | u32 len | name[len]
//! ```

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::path::Path;

use super::{cvt, path_to_cstring};
use crate::mask::EventMask;

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 16;

#[derive(Debug)]
pub struct Inotify {
    fd: OwnedFd,
}

impl Inotify {
    pub fn init() -> io::Result<Self> {
        let fd = cvt(unsafe { libc::inotify_init1(libc::IN_CLOEXEC) })?;
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Adds (or updates) the watch on `path`, returning the kernel descriptor.
    ///
    /// The kernel hands back the same descriptor when the inode is already
    /// watched.
    pub fn add_watch(&self, path: &Path, mask: EventMask) -> io::Result<i32> {
        let path = path_to_cstring(path)?;
        cvt(unsafe { libc::inotify_add_watch(self.fd.as_raw_fd(), path.as_ptr(), mask.bits()) })
    }

    pub fn rm_watch(&self, wd: i32) -> io::Result<()> {
        cvt(unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), wd) }).map(drop)
    }
}

impl AsFd for Inotify {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// A decoded inotify record borrowing its name from the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InotifyRecord<'a> {
    pub wd: i32,
    pub mask: u32,
    pub cookie: u32,
    /// Name with the NUL padding stripped; empty for events on the watch itself.
    pub name: &'a [u8],
}

/// Returns the full length of the record at the front of `buf`, or `None`
/// when the header or the name is not completely buffered yet.
pub fn record_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let name_len = read_u32(buf, 12) as usize;
    let total = HEADER_LEN + name_len;
    (buf.len() >= total).then_some(total)
}

/// Decodes one complete record. `buf` must be exactly one record as framed by
/// [`record_len`].
pub fn parse_record(buf: &[u8]) -> InotifyRecord<'_> {
    let raw_name = &buf[HEADER_LEN.min(buf.len())..];
    let name = match memchr::memchr(0, raw_name) {
        Some(end) => &raw_name[..end],
        None => raw_name,
    };
    InotifyRecord {
        wd: read_u32(buf, 0) as i32,
        mask: read_u32(buf, 4),
        cookie: read_u32(buf, 8),
        name,
    }
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_ne_bytes(raw)
}

/// Encodes a record the way the kernel lays it out, padding the name to a
/// multiple of 16 bytes.
#[cfg(test)]
pub(crate) fn encode_record(wd: i32, mask: u32, cookie: u32, name: &str) -> Vec<u8> {
    let padded = if name.is_empty() {
        0
    } else {
        (name.len() + 1).div_ceil(HEADER_LEN) * HEADER_LEN
    };
    let mut out = Vec::with_capacity(HEADER_LEN + padded);
    out.extend_from_slice(&wd.to_ne_bytes());
    out.extend_from_slice(&mask.to_ne_bytes());
    out.extend_from_slice(&cookie.to_ne_bytes());
    out.extend_from_slice(&(padded as u32).to_ne_bytes());
    out.extend_from_slice(name.as_bytes());
    out.resize(HEADER_LEN + padded, 0);
    out
}
