//! Kernel limits under `/proc/sys/fs/inotify`.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{NotifyError, Result};

const PROC_DIR: &str = "/proc/sys/fs/inotify";

/// Watches a single user may hold across all instances.
pub fn max_user_watches() -> Result<u64> {
    read_limit(&Path::new(PROC_DIR).join("max_user_watches"))
}

/// inotify instances a single user may create.
pub fn max_user_instances() -> Result<u64> {
    read_limit(&Path::new(PROC_DIR).join("max_user_instances"))
}

/// Events queued per instance before the kernel reports `Q_OVERFLOW`.
pub fn max_queued_events() -> Result<u64> {
    read_limit(&Path::new(PROC_DIR).join("max_queued_events"))
}

pub(crate) fn read_limit(path: &Path) -> Result<u64> {
    let raw = fs::read_to_string(path)?;
    raw.trim().parse().map_err(|err| {
        NotifyError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{}: {err}", path.display()),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_newline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("max_user_watches");
        fs::write(&path, "8192\n").expect("write");
        assert_eq!(read_limit(&path).expect("read"), 8192);
    }

    #[test]
    fn garbage_is_invalid_data() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("limit");
        fs::write(&path, "lots").expect("write");
        let err = read_limit(&path).unwrap_err();
        assert!(matches!(err, NotifyError::Io(ref e) if e.kind() == io::ErrorKind::InvalidData));
    }

    #[test]
    fn live_limits_are_positive_when_present() {
        if !Path::new(PROC_DIR).exists() {
            return;
        }
        assert!(max_user_watches().expect("max_user_watches") > 0);
        assert!(max_user_instances().expect("max_user_instances") > 0);
        assert!(max_queued_events().expect("max_queued_events") > 0);
    }
}
