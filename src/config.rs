//! Registry configuration.
//!
//! Configuration is plain JSON so a front end can keep it next to its own
//! settings:
//!
//! ```json
//! { "backend": "fanotify", "scope": "filesystem", "verbose": 1 }
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::kernel::fanotify::{FAN_MARK_FILESYSTEM, FAN_MARK_INODE, FAN_MARK_MOUNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    /// Per-inode watches with kernel watch descriptors.
    #[default]
    Inotify,
    /// Marks reporting file handles; needs `CAP_SYS_ADMIN`.
    Fanotify,
}

impl BackendKind {
    pub fn is_fanotify(self) -> bool {
        matches!(self, BackendKind::Fanotify)
    }
}

/// What a fanotify mark covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkScope {
    /// The marked inode, plus its children for directories.
    #[default]
    Inode,
    /// Every object on the filesystem containing the path.
    Filesystem,
    /// Every object on the mount containing the path.
    Mount,
}

impl MarkScope {
    pub(crate) fn mark_flags(self) -> libc::c_uint {
        match self {
            MarkScope::Inode => FAN_MARK_INODE,
            MarkScope::Filesystem => FAN_MARK_FILESYSTEM,
            MarkScope::Mount => FAN_MARK_MOUNT,
        }
    }

    /// True for the scopes where a single mark covers objects we never
    /// looked up ourselves.
    pub fn is_wide(self) -> bool {
        !matches!(self, MarkScope::Inode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotifyConfig {
    pub backend: BackendKind,
    /// Only meaningful for the fanotify backend.
    pub scope: MarkScope,
    /// 1 logs newly resolved object identifiers, 2 also traces every record.
    pub verbose: u8,
    /// Start with statistics collection enabled.
    pub stats: bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Inotify,
            scope: MarkScope::Inode,
            verbose: 0,
            stats: false,
        }
    }
}

impl NotifyConfig {
    pub fn inotify() -> Self {
        Self::default()
    }

    pub fn fanotify(scope: MarkScope) -> Self {
        Self {
            backend: BackendKind::Fanotify,
            scope,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_take_defaults() {
        let config = NotifyConfig::from_json_str("{}").expect("parse");
        assert_eq!(config, NotifyConfig::default());
        assert_eq!(config.backend, BackendKind::Inotify);
    }

    #[test]
    fn parses_camel_case_values() {
        let value = json!({
            "backend": "fanotify",
            "scope": "filesystem",
            "verbose": 2,
            "stats": true
        });
        let config = NotifyConfig::from_json_str(&value.to_string()).expect("parse");
        assert_eq!(config.backend, BackendKind::Fanotify);
        assert_eq!(config.scope, MarkScope::Filesystem);
        assert_eq!(config.verbose, 2);
        assert!(config.stats);
        assert!(config.scope.is_wide());
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = NotifyConfig::from_json_str(r#"{"backend":"kqueue"}"#).unwrap_err();
        assert!(matches!(err, crate::NotifyError::Config(_)));
    }

    #[test]
    fn loads_from_file_and_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notify.json");
        let config = NotifyConfig::fanotify(MarkScope::Mount);
        fs::write(&path, serde_json::to_string(&config).expect("serialize")).expect("write");
        assert_eq!(NotifyConfig::load(&path).expect("load"), config);
        assert_eq!(MarkScope::Mount.mark_flags(), FAN_MARK_MOUNT);
    }
}
