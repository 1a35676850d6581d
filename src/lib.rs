//! Watch registry and event normalization over Linux inotify and fanotify.
//!
//! This crate provides:
//! - A registry mapping kernel watch descriptors and fanotify file handles
//!   to the paths they were established on
//! - Recursive watching of directory trees, with exclusions
//! - A buffered reader that yields whole events, with overflow reporting
//! - Regex event filtering and `%w %f %e` style event rendering
//! - Per-watch event statistics

pub mod config;
pub mod error;
pub mod filter;
pub mod follow;
pub mod format;
pub mod kernel;
pub mod limits;
pub mod mask;
pub mod reader;
pub mod registry;
pub mod resolve;
pub mod storage;

// Re-export main types
pub use config::{BackendKind, MarkScope, NotifyConfig};
pub use error::{NotifyError, Result};
pub use filter::{EventFilter, FilterFlags, FilterSense};
pub use follow::RecursiveFollower;
pub use format::{Formatter, MAX_STRLEN};
pub use mask::{EventMask, ParseMaskError};
pub use reader::Timeout;
pub use registry::{Event, Registry, SortOrder, StatKind, WatchId};
pub use resolve::{PathResolver, ProcFdResolver};
