//! File handles, filesystem ids and directory descriptors.
//!
//! fanotify in FID mode identifies objects by `(fsid, file_handle)` rather
//! than by path. This module encodes handles for paths we mark
//! (`name_to_handle_at`), opens handles reported in events
//! (`open_by_handle_at`) and reads the filesystem id (`statfs`).

use std::fs::{File, OpenOptions};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use super::{cvt, path_to_cstring};

// ---------------------------------------------------------------------------
// Kernel constants
// ---------------------------------------------------------------------------

/// Largest handle we are prepared to store.
pub const MAX_HANDLE_BYTES: usize = 64;

/// Request a handle usable only as an identifier (Linux 6.5+). Shares its
/// value with `AT_REMOVEDIR`.
pub const AT_HANDLE_FID: libc::c_int = 0x200;

/// btrfs subvolume handles; the second fsid word differs per subvolume.
pub const FILEID_BTRFS_WITHOUT_PARENT: i32 = 0x4d;

const BTRFS_SUPER_MAGIC: u32 = 0x9123_683e;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// `__kernel_fsid_t` as two words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fsid(pub [i32; 2]);

impl Fsid {
    /// Drops the per-subvolume word so all btrfs subvolumes share one id.
    #[inline]
    pub fn narrowed(self) -> Self {
        Fsid([self.0[0], 0])
    }
}

/// An encoded `struct file_handle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub handle_type: i32,
    pub bytes: Vec<u8>,
}

#[repr(C)]
struct RawFileHandle {
    handle_bytes: u32,
    handle_type: libc::c_int,
    f_handle: [u8; MAX_HANDLE_BYTES],
}

impl RawFileHandle {
    fn empty() -> Self {
        Self {
            handle_bytes: MAX_HANDLE_BYTES as u32,
            handle_type: 0,
            f_handle: [0; MAX_HANDLE_BYTES],
        }
    }
}

/// Result of `statfs` on a marked path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStat {
    pub fsid: Fsid,
    pub is_btrfs: bool,
}

// ---------------------------------------------------------------------------
// Syscalls
// ---------------------------------------------------------------------------

/// Encodes a handle for `path` relative to the current directory.
pub fn name_to_handle_at(path: &Path, flags: libc::c_int) -> io::Result<FileHandle> {
    let path = path_to_cstring(path)?;
    let mut raw = RawFileHandle::empty();
    let mut mount_id: libc::c_int = 0;
    let ret = unsafe {
        libc::syscall(
            libc::SYS_name_to_handle_at,
            libc::AT_FDCWD,
            path.as_ptr(),
            &mut raw as *mut RawFileHandle,
            &mut mount_id as *mut libc::c_int,
            flags,
        )
    };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    let len = raw.handle_bytes as usize;
    if len > MAX_HANDLE_BYTES {
        return Err(io::Error::from_raw_os_error(libc::EOVERFLOW));
    }
    Ok(FileHandle {
        handle_type: raw.handle_type,
        bytes: raw.f_handle[..len].to_vec(),
    })
}

/// Opens the object behind `handle`. `mount` selects the filesystem; `None`
/// uses the filesystem of the current directory.
pub fn open_by_handle_at(
    mount: Option<BorrowedFd<'_>>,
    handle: &FileHandle,
    flags: libc::c_int,
) -> io::Result<OwnedFd> {
    if handle.bytes.len() > MAX_HANDLE_BYTES {
        return Err(io::Error::from_raw_os_error(libc::EOVERFLOW));
    }
    let mut raw = RawFileHandle::empty();
    raw.handle_bytes = handle.bytes.len() as u32;
    raw.handle_type = handle.handle_type;
    raw.f_handle[..handle.bytes.len()].copy_from_slice(&handle.bytes);

    let mount_fd = mount.map_or(libc::AT_FDCWD, |fd| fd.as_raw_fd());
    let ret = unsafe {
        libc::syscall(
            libc::SYS_open_by_handle_at,
            mount_fd,
            &mut raw as *mut RawFileHandle,
            flags | libc::O_CLOEXEC,
        )
    };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(ret as libc::c_int) })
}

pub fn statfs(path: &Path) -> io::Result<FsStat> {
    let path = path_to_cstring(path)?;
    let mut buf: libc::statfs = unsafe { mem::zeroed() };
    cvt(unsafe { libc::statfs(path.as_ptr(), &mut buf) })?;
    // fsid_t keeps its words private; it is two c_ints.
    let words: [i32; 2] = unsafe { mem::transmute_copy(&buf.f_fsid) };
    Ok(FsStat {
        fsid: Fsid(words),
        is_btrfs: buf.f_type as u32 == BTRFS_SUPER_MAGIC,
    })
}

/// Checks whether `name` still exists inside `dir` without following links.
pub fn exists_at(dir: BorrowedFd<'_>, name: &[u8]) -> io::Result<bool> {
    let name = std::ffi::CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "name contains a NUL byte"))?;
    let ret = unsafe {
        libc::faccessat(
            dir.as_raw_fd(),
            name.as_ptr(),
            libc::F_OK,
            libc::AT_SYMLINK_NOFOLLOW,
        )
    };
    if ret == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ENOENT) {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Opens a directory as an `O_PATH` descriptor, usable for path lookups only.
pub fn open_path_dir(path: &Path) -> io::Result<OwnedFd> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_PATH | libc::O_DIRECTORY | libc::O_CLOEXEC)
        .open(path)?;
    Ok(OwnedFd::from(file))
}

/// Opens a directory for reading; used as the `mount_fd` of a filesystem.
pub fn open_dir(path: &Path) -> io::Result<OwnedFd> {
    Ok(OwnedFd::from(File::open(path)?))
}
