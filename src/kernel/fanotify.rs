//! fanotify descriptor, marks and FID record decoding.
//!
//! The group is created with `FAN_REPORT_FID | FAN_REPORT_DFID_NAME`, so
//! every record is a metadata header followed by an info block naming the
//! object by file handle instead of an open descriptor:
//!
//! ```text
//! metadata   u32 event_len | u8 vers | u8 reserved | u16 metadata_len
//!            u64 mask | i32 fd | i32 pid
//! info       u8 info_type | u8 pad | u16 len
//!            i32 fsid[2]
//!            u32 handle_bytes | i32 handle_type | u8 f_handle[handle_bytes]
//!            [NUL terminated name, DFID_NAME only]
//! ```

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::path::Path;

use super::handle::{FileHandle, Fsid};
use super::{cvt, path_to_cstring};
use crate::error::{NotifyError, Result};

// ---------------------------------------------------------------------------
// Kernel constants
// ---------------------------------------------------------------------------

const FAN_CLOEXEC: libc::c_uint = 0x0000_0001;
const FAN_CLASS_NOTIF: libc::c_uint = 0x0000_0000;
const FAN_REPORT_FID: libc::c_uint = 0x0000_0200;
const FAN_REPORT_DIR_FID: libc::c_uint = 0x0000_0400;
const FAN_REPORT_NAME: libc::c_uint = 0x0000_0800;
pub const FAN_REPORT_DFID_NAME: libc::c_uint = FAN_REPORT_DIR_FID | FAN_REPORT_NAME;

pub const FAN_MARK_ADD: libc::c_uint = 0x0000_0001;
pub const FAN_MARK_REMOVE: libc::c_uint = 0x0000_0002;
pub const FAN_MARK_DONT_FOLLOW: libc::c_uint = 0x0000_0004;
pub const FAN_MARK_INODE: libc::c_uint = 0x0000_0000;
pub const FAN_MARK_MOUNT: libc::c_uint = 0x0000_0010;
pub const FAN_MARK_FILESYSTEM: libc::c_uint = 0x0000_0100;

pub const FAN_EVENT_ON_CHILD: u64 = 0x0800_0000;

pub const FAN_EVENT_INFO_TYPE_FID: u8 = 1;
pub const FAN_EVENT_INFO_TYPE_DFID_NAME: u8 = 2;
pub const FAN_EVENT_INFO_TYPE_DFID: u8 = 3;

/// `sizeof(struct fanotify_event_metadata)`.
pub const METADATA_LEN: usize = 24;

/// Info header, fsid and the two `file_handle` words.
const FID_HEADER_LEN: usize = 20;

// ---------------------------------------------------------------------------
// Group descriptor
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Fanotify {
    fd: OwnedFd,
}

impl Fanotify {
    /// Creates a notification group that reports directory file handles and
    /// names. Needs `CAP_SYS_ADMIN`.
    pub fn init() -> io::Result<Self> {
        let flags = FAN_CLOEXEC | FAN_CLASS_NOTIF | FAN_REPORT_FID | FAN_REPORT_DFID_NAME;
        let fd = cvt(unsafe { libc::fanotify_init(flags, libc::O_RDONLY as libc::c_uint) })?;
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    pub fn mark(&self, flags: libc::c_uint, mask: u64, path: &Path) -> io::Result<()> {
        let path = path_to_cstring(path)?;
        cvt(unsafe {
            libc::fanotify_mark(
                self.fd.as_raw_fd(),
                flags,
                mask,
                libc::AT_FDCWD,
                path.as_ptr(),
            )
        })
        .map(drop)
    }
}

impl AsFd for Fanotify {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

// ---------------------------------------------------------------------------
// Record decoding
// ---------------------------------------------------------------------------

/// A decoded fanotify record borrowing from the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanotifyRecord<'a> {
    pub mask: u64,
    pub fd: i32,
    pub pid: i32,
    pub info: Option<FidInfo<'a>>,
}

/// The first FID style info block of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FidInfo<'a> {
    pub info_type: u8,
    pub fsid: Fsid,
    pub handle_type: i32,
    pub handle: &'a [u8],
    /// Child name for `DFID_NAME` blocks. Empty names and `.` are dropped.
    pub name: Option<&'a [u8]>,
}

impl FidInfo<'_> {
    pub fn file_handle(&self) -> FileHandle {
        FileHandle {
            handle_type: self.handle_type,
            bytes: self.handle.to_vec(),
        }
    }
}

/// Returns the length of the record at the front of `buf`, `None` when it is
/// not fully buffered.
pub fn record_len(buf: &[u8]) -> Result<Option<usize>> {
    if buf.len() < METADATA_LEN {
        return Ok(None);
    }
    let event_len = read_u32(buf, 0) as usize;
    if event_len < METADATA_LEN {
        return Err(NotifyError::MalformedRecord(format!(
            "event_len {event_len} shorter than metadata"
        )));
    }
    Ok((buf.len() >= event_len).then_some(event_len))
}

/// Decodes one complete record as framed by [`record_len`].
pub fn parse_record(buf: &[u8]) -> Result<FanotifyRecord<'_>> {
    if buf.len() < METADATA_LEN {
        return Err(NotifyError::MalformedRecord(format!(
            "record of {} bytes is shorter than metadata",
            buf.len()
        )));
    }
    let metadata_len = usize::from(read_u16(buf, 6));
    if metadata_len < METADATA_LEN || metadata_len > buf.len() {
        return Err(NotifyError::MalformedRecord(format!(
            "metadata_len {metadata_len} out of range"
        )));
    }
    let info = if buf.len() > metadata_len {
        parse_info(&buf[metadata_len..])?
    } else {
        None
    };
    Ok(FanotifyRecord {
        mask: read_u64(buf, 8),
        fd: read_u32(buf, 16) as i32,
        pid: read_u32(buf, 20) as i32,
        info,
    })
}

fn parse_info(buf: &[u8]) -> Result<Option<FidInfo<'_>>> {
    if buf.len() < 4 {
        return Err(NotifyError::MalformedRecord("truncated info header".into()));
    }
    let info_type = buf[0];
    if !matches!(
        info_type,
        FAN_EVENT_INFO_TYPE_FID | FAN_EVENT_INFO_TYPE_DFID | FAN_EVENT_INFO_TYPE_DFID_NAME
    ) {
        return Ok(None);
    }
    let info_len = usize::from(read_u16(buf, 2));
    if info_len < FID_HEADER_LEN || info_len > buf.len() {
        return Err(NotifyError::MalformedRecord(format!(
            "info len {info_len} out of range"
        )));
    }
    let info = &buf[..info_len];
    let fsid = Fsid([read_u32(info, 4) as i32, read_u32(info, 8) as i32]);
    let handle_bytes = read_u32(info, 12) as usize;
    let handle_type = read_u32(info, 16) as i32;
    let handle_end = FID_HEADER_LEN + handle_bytes;
    if handle_end > info_len {
        return Err(NotifyError::MalformedRecord(format!(
            "handle of {handle_bytes} bytes overruns info block"
        )));
    }

    let name = if info_type == FAN_EVENT_INFO_TYPE_DFID_NAME {
        let raw = &info[handle_end..];
        let raw = match memchr::memchr(0, raw) {
            Some(end) => &raw[..end],
            None => raw,
        };
        (!raw.is_empty() && raw != b".").then_some(raw)
    } else {
        None
    };

    Ok(Some(FidInfo {
        info_type,
        fsid,
        handle_type,
        handle: &info[FID_HEADER_LEN..handle_end],
        name,
    }))
}

#[inline]
fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_ne_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_ne_bytes(raw)
}

#[inline]
fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_ne_bytes(raw)
}

/// Test helper building a record the way the kernel would.
#[cfg(test)]
pub(crate) fn encode_record(
    mask: u64,
    pid: i32,
    info: Option<(u8, [i32; 2], i32, &[u8], &[u8])>,
) -> Vec<u8> {
    let mut info_bytes = Vec::new();
    if let Some((info_type, fsid, handle_type, handle, name)) = info {
        info_bytes.push(info_type);
        info_bytes.push(0);
        info_bytes.extend_from_slice(&[0, 0]);
        info_bytes.extend_from_slice(&fsid[0].to_ne_bytes());
        info_bytes.extend_from_slice(&fsid[1].to_ne_bytes());
        info_bytes.extend_from_slice(&(handle.len() as u32).to_ne_bytes());
        info_bytes.extend_from_slice(&handle_type.to_ne_bytes());
        info_bytes.extend_from_slice(handle);
        if info_type == FAN_EVENT_INFO_TYPE_DFID_NAME {
            info_bytes.extend_from_slice(name);
            info_bytes.push(0);
        }
        info_bytes.resize(info_bytes.len().div_ceil(4) * 4, 0);
        let len = info_bytes.len() as u16;
        info_bytes[2..4].copy_from_slice(&len.to_ne_bytes());
    }

    let event_len = (METADATA_LEN + info_bytes.len()) as u32;
    let mut out = Vec::with_capacity(event_len as usize);
    out.extend_from_slice(&event_len.to_ne_bytes());
    out.push(3);
    out.push(0);
    out.extend_from_slice(&(METADATA_LEN as u16).to_ne_bytes());
    out.extend_from_slice(&mask.to_ne_bytes());
    out.extend_from_slice(&(-1i32).to_ne_bytes());
    out.extend_from_slice(&pid.to_ne_bytes());
    out.extend_from_slice(&info_bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDLE: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8];

    #[test]
    fn frames_by_event_len() {
        let record = encode_record(
            0x100,
            42,
            Some((FAN_EVENT_INFO_TYPE_DFID_NAME, [7, 9], 1, HANDLE, &b"new.txt"[..])),
        );
        assert_eq!(record_len(&record[..METADATA_LEN - 1]).unwrap(), None);
        assert_eq!(record_len(&record[..METADATA_LEN + 4]).unwrap(), None);
        assert_eq!(record_len(&record).unwrap(), Some(record.len()));
    }

    #[test]
    fn rejects_impossible_event_len() {
        let mut record = encode_record(0x4000, 0, None);
        record[0..4].copy_from_slice(&8u32.to_ne_bytes());
        assert!(matches!(
            record_len(&record),
            Err(NotifyError::MalformedRecord(_))
        ));
    }

    #[test]
    fn decodes_dfid_name_block() {
        let record = encode_record(
            0x100 | 0x4000_0000,
            42,
            Some((FAN_EVENT_INFO_TYPE_DFID_NAME, [7, 9], 1, HANDLE, &b"new.txt"[..])),
        );
        let parsed = parse_record(&record).expect("parse");
        assert_eq!(parsed.mask, 0x4000_0100);
        assert_eq!(parsed.pid, 42);
        assert_eq!(parsed.fd, -1);
        let info = parsed.info.expect("info block");
        assert_eq!(info.info_type, FAN_EVENT_INFO_TYPE_DFID_NAME);
        assert_eq!(info.fsid, Fsid([7, 9]));
        assert_eq!(info.handle, HANDLE);
        assert_eq!(info.name, Some(&b"new.txt"[..]));
        assert_eq!(info.file_handle().bytes, HANDLE.to_vec());
    }

    #[test]
    fn drops_dot_and_empty_names() {
        for name in [&b"."[..], &b""[..]] {
            let record = encode_record(
                0x2,
                1,
                Some((FAN_EVENT_INFO_TYPE_DFID_NAME, [1, 1], 1, HANDLE, name)),
            );
            let info = parse_record(&record).unwrap().info.unwrap();
            assert_eq!(info.name, None);
        }
    }

    #[test]
    fn overflow_has_no_info() {
        let record = encode_record(0x4000, 0, None);
        let parsed = parse_record(&record).expect("parse");
        assert_eq!(parsed.mask, 0x4000);
        assert!(parsed.info.is_none());
    }

    #[test]
    fn rejects_handle_overrun() {
        let mut record = encode_record(
            0x2,
            1,
            Some((FAN_EVENT_INFO_TYPE_DFID, [1, 1], 1, HANDLE, &b""[..])),
        );
        // claim a handle longer than the info block
        record[METADATA_LEN + 12..METADATA_LEN + 16].copy_from_slice(&200u32.to_ne_bytes());
        assert!(matches!(
            parse_record(&record),
            Err(NotifyError::MalformedRecord(_))
        ));
    }
}
