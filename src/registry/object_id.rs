//! Opaque fanotify object identifiers.

use std::cmp::Ordering;
use std::fmt;

use crate::kernel::fanotify::{
    FidInfo, FAN_EVENT_INFO_TYPE_DFID, FAN_EVENT_INFO_TYPE_DFID_NAME, FAN_EVENT_INFO_TYPE_FID,
};
use crate::kernel::handle::{FileHandle, Fsid, FILEID_BTRFS_WITHOUT_PARENT};

const HEADER_LEN: usize = 20;

/// A filesystem object as fanotify names it: filesystem id, file handle and,
/// for directory entry events, the child name.
///
/// Stored as one length-prefixed blob laid out like the kernel's info block
/// (without padding):
///
/// ```text
/// u8 info_type | u8 0 | u16 len | i32 fsid[2] | u32 handle_bytes | i32 handle_type
/// | handle | name
/// ```
///
/// Equality is bytewise; ordering compares length first, then bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(Box<[u8]>);

impl ObjectId {
    pub fn new(
        info_type: u8,
        fsid: Fsid,
        handle_type: i32,
        handle: &[u8],
        name: Option<&[u8]>,
    ) -> Self {
        let name = name.unwrap_or_default();
        let len = HEADER_LEN + handle.len() + name.len();
        let mut blob = Vec::with_capacity(len);
        blob.push(info_type);
        blob.push(0);
        blob.extend_from_slice(&(len as u16).to_ne_bytes());
        blob.extend_from_slice(&fsid.0[0].to_ne_bytes());
        blob.extend_from_slice(&fsid.0[1].to_ne_bytes());
        blob.extend_from_slice(&(handle.len() as u32).to_ne_bytes());
        blob.extend_from_slice(&handle_type.to_ne_bytes());
        blob.extend_from_slice(handle);
        blob.extend_from_slice(name);
        Self(blob.into_boxed_slice())
    }

    /// Key for the object a mark was placed on: `DFID` for directories,
    /// `FID` otherwise.
    pub fn for_mark(fsid: Fsid, handle: &FileHandle, is_dir: bool) -> Self {
        let info_type = if is_dir {
            FAN_EVENT_INFO_TYPE_DFID
        } else {
            FAN_EVENT_INFO_TYPE_FID
        };
        Self::new(info_type, fsid, handle.handle_type, &handle.bytes, None)
    }

    /// Key for an event's info block.
    ///
    /// btrfs subvolumes report different second fsid words for one
    /// filesystem, so for btrfs handles only the first word is kept.
    pub fn from_info(info: &FidInfo<'_>) -> Self {
        let fsid = if info.handle_type == FILEID_BTRFS_WITHOUT_PARENT {
            info.fsid.narrowed()
        } else {
            info.fsid
        };
        Self::new(info.info_type, fsid, info.handle_type, info.handle, info.name)
    }

    pub fn info_type(&self) -> u8 {
        self.0[0]
    }

    pub fn fsid(&self) -> Fsid {
        Fsid([self.read_i32(4), self.read_i32(8)])
    }

    pub fn handle_type(&self) -> i32 {
        self.read_i32(16)
    }

    pub fn handle(&self) -> &[u8] {
        let handle_len = self.read_i32(12) as usize;
        &self.0[HEADER_LEN..HEADER_LEN + handle_len]
    }

    /// Child name of a `DFID_NAME` identifier.
    pub fn name(&self) -> Option<&[u8]> {
        let name = &self.0[HEADER_LEN + self.handle().len()..];
        (!name.is_empty()).then_some(name)
    }

    /// The directory part of a `DFID_NAME` identifier, as `DFID`.
    pub fn without_name(&self) -> Self {
        let info_type = if self.info_type() == FAN_EVENT_INFO_TYPE_DFID_NAME {
            FAN_EVENT_INFO_TYPE_DFID
        } else {
            self.info_type()
        };
        Self::new(info_type, self.fsid(), self.handle_type(), self.handle(), None)
    }

    pub fn file_handle(&self) -> FileHandle {
        FileHandle {
            handle_type: self.handle_type(),
            bytes: self.handle().to_vec(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn read_i32(&self, offset: usize) -> i32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.0[offset..offset + 4]);
        i32::from_ne_bytes(raw)
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Fsid([a, b]) = self.fsid();
        write!(f, "fid={a:x}.{b:x}.")?;
        for byte in self.handle() {
            write!(f, "{byte:02x}")?;
        }
        if let Some(name) = self.name() {
            write!(f, ";name='{}'", String::from_utf8_lossy(name))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDLE: &[u8] = &[0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4];

    #[test]
    fn fields_round_trip() {
        let id = ObjectId::new(
            FAN_EVENT_INFO_TYPE_DFID_NAME,
            Fsid([3, 4]),
            1,
            HANDLE,
            Some(b"child"),
        );
        assert_eq!(id.info_type(), FAN_EVENT_INFO_TYPE_DFID_NAME);
        assert_eq!(id.fsid(), Fsid([3, 4]));
        assert_eq!(id.handle_type(), 1);
        assert_eq!(id.handle(), HANDLE);
        assert_eq!(id.name(), Some(&b"child"[..]));
        assert_eq!(id.len(), HEADER_LEN + HANDLE.len() + 5);
    }

    #[test]
    fn directory_key_matches_mark_key() {
        let handle = FileHandle {
            handle_type: 1,
            bytes: HANDLE.to_vec(),
        };
        let mark = ObjectId::for_mark(Fsid([3, 4]), &handle, true);
        let event = ObjectId::new(
            FAN_EVENT_INFO_TYPE_DFID_NAME,
            Fsid([3, 4]),
            1,
            HANDLE,
            Some(b"child"),
        );
        assert_ne!(mark, event);
        assert_eq!(event.without_name(), mark);
        assert_eq!(event.file_handle(), handle);
    }

    #[test]
    fn orders_by_length_then_bytes() {
        let short = ObjectId::new(FAN_EVENT_INFO_TYPE_FID, Fsid([9, 9]), 1, HANDLE, None);
        let long = ObjectId::new(FAN_EVENT_INFO_TYPE_FID, Fsid([0, 0]), 1, HANDLE, Some(b"x"));
        assert!(short < long);

        let a = ObjectId::new(FAN_EVENT_INFO_TYPE_FID, Fsid([1, 0]), 1, HANDLE, None);
        let b = ObjectId::new(FAN_EVENT_INFO_TYPE_FID, Fsid([2, 0]), 1, HANDLE, None);
        assert_eq!(a.cmp(&b), a.as_bytes().cmp(b.as_bytes()));
    }

    #[test]
    fn btrfs_subvolumes_collapse() {
        let info = |fsid| FidInfo {
            info_type: FAN_EVENT_INFO_TYPE_DFID,
            fsid,
            handle_type: FILEID_BTRFS_WITHOUT_PARENT,
            handle: HANDLE,
            name: None,
        };
        assert_eq!(
            ObjectId::from_info(&info(Fsid([7, 100]))),
            ObjectId::from_info(&info(Fsid([7, 200])))
        );

        let other = FidInfo {
            handle_type: 1,
            ..info(Fsid([7, 100]))
        };
        assert_eq!(ObjectId::from_info(&other).fsid(), Fsid([7, 100]));
    }

    #[test]
    fn debug_is_readable() {
        let id = ObjectId::new(
            FAN_EVENT_INFO_TYPE_DFID_NAME,
            Fsid([0x10, 0x20]),
            1,
            &[0xab],
            Some(b"f"),
        );
        assert_eq!(format!("{id:?}"), "fid=10.20.ab;name='f'");
    }
}
