use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to initialize {backend}: {source}")]
    Init {
        backend: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Failed to watch {}: {source}", path.display())]
    Watch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove watch {id}: {source}")]
    Unwatch {
        id: i32,
        #[source]
        source: io::Error,
    },

    #[error("Statfs failed on {}: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Encode fid failed on {}: {source}", path.display())]
    EncodeHandle {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed waiting for events: {0}")]
    Wait(#[source] io::Error),

    #[error("Failed to read events: {0}")]
    Read(#[source] io::Error),

    #[error("Interrupted while waiting for events")]
    Interrupted,

    #[error("Event queue reported end-of-file, possibly too many events occurred at once")]
    QueueOverrun,

    #[error("No object identifier in fanotify event")]
    MissingObjectId,

    #[error("Failed to resolve path from object identifier: {0}")]
    ResolvePath(#[source] io::Error),

    #[error("Malformed event record: {0}")]
    MalformedRecord(String),

    #[error("Invalid filter expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("String of {len} bytes exceeds the {max} byte limit")]
    StringTooLong { len: usize, max: usize },

    #[error("Invalid format string: {0}")]
    InvalidFormat(String),

    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl NotifyError {
    /// Returns the platform error code behind this failure, if there is one.
    ///
    /// Library-level conditions map onto the errno a C caller would have seen.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Init { source, .. }
            | Self::Watch { source, .. }
            | Self::Unwatch { source, .. }
            | Self::Stat { source, .. }
            | Self::EncodeHandle { source, .. }
            | Self::Open { source, .. }
            | Self::ReadDir { source, .. } => source.raw_os_error(),
            Self::Wait(source) | Self::Read(source) | Self::ResolvePath(source) | Self::Io(source) => {
                source.raw_os_error()
            }
            Self::Interrupted => Some(libc::EINTR),
            Self::StringTooLong { .. } => Some(libc::EMSGSIZE),
            Self::InvalidRegex(_) | Self::InvalidFormat(_) | Self::InvalidTimeFormat(_) => {
                Some(libc::EINVAL)
            }
            Self::QueueOverrun
            | Self::MissingObjectId
            | Self::MalformedRecord(_)
            | Self::Config(_) => None,
        }
    }

    /// True when the kernel refused a watch because the per-user watch limit
    /// (`fs.inotify.max_user_watches`) is exhausted.
    pub fn is_watch_limit(&self) -> bool {
        matches!(self, Self::Watch { source, .. } if source.raw_os_error() == Some(libc::ENOSPC))
    }

    /// True for conditions the caller should retry rather than treat as fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, NotifyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_limit_is_detected_from_enospc() {
        let err = NotifyError::Watch {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::from_raw_os_error(libc::ENOSPC),
        };
        assert!(err.is_watch_limit());
        assert_eq!(err.raw_os_error(), Some(libc::ENOSPC));

        let err = NotifyError::Watch {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::from_raw_os_error(libc::EACCES),
        };
        assert!(!err.is_watch_limit());
    }

    #[test]
    fn library_conditions_carry_errno() {
        assert_eq!(NotifyError::Interrupted.raw_os_error(), Some(libc::EINTR));
        assert!(NotifyError::Interrupted.is_retryable());
        assert_eq!(
            NotifyError::StringTooLong { len: 5000, max: 4096 }.raw_os_error(),
            Some(libc::EMSGSIZE)
        );
        assert_eq!(NotifyError::QueueOverrun.raw_os_error(), None);
        assert!(!NotifyError::QueueOverrun.is_retryable());
    }
}
