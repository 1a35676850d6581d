//! Regex filtering of event paths.

use bitflags::bitflags;
use regex::{Regex, RegexBuilder};

use crate::error::{NotifyError, Result};
use crate::format::{truncate_to_boundary, MAX_STRLEN};
use crate::mask::EventMask;

bitflags! {
    /// Compile options for a filter expression.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FilterFlags: u32 {
        const CASE_INSENSITIVE = 0x1;
        const MULTI_LINE       = 0x2;
        /// `.` also matches `\n`.
        const DOT_MATCHES_NEW_LINE = 0x4;
    }
}

/// What a match means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterSense {
    /// Drop events whose path matches.
    #[default]
    Exclude,
    /// Drop events whose path does not match.
    IncludeOnly,
}

#[derive(Debug, Clone)]
pub struct EventFilter {
    regex: Regex,
    sense: FilterSense,
    recursive_aware: bool,
}

impl EventFilter {
    /// Compiles `pattern`. With `recursive_aware`, directory create and
    /// move-in events always pass so a recursive follower can watch new
    /// subdirectories.
    pub fn new(
        pattern: &str,
        flags: FilterFlags,
        sense: FilterSense,
        recursive_aware: bool,
    ) -> Result<Self> {
        if pattern.len() > MAX_STRLEN {
            return Err(NotifyError::StringTooLong {
                len: pattern.len(),
                max: MAX_STRLEN,
            });
        }
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(flags.contains(FilterFlags::CASE_INSENSITIVE))
            .multi_line(flags.contains(FilterFlags::MULTI_LINE))
            .dot_matches_new_line(flags.contains(FilterFlags::DOT_MATCHES_NEW_LINE))
            .build()?;
        Ok(Self {
            regex,
            sense,
            recursive_aware,
        })
    }

    pub fn sense(&self) -> FilterSense {
        self.sense
    }

    pub fn is_recursive_aware(&self) -> bool {
        self.recursive_aware
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether `path` matches the expression.
    pub fn test(&self, path: &str) -> Result<bool> {
        if path.len() > MAX_STRLEN {
            return Err(NotifyError::StringTooLong {
                len: path.len(),
                max: MAX_STRLEN,
            });
        }
        Ok(self.regex.is_match(path))
    }

    /// True when the event must not reach the caller.
    ///
    /// `path` is the composed watch path plus name. Anything past
    /// [`MAX_STRLEN`] is cut before matching.
    pub fn rejects(&self, path: &str, mask: EventMask) -> bool {
        if self.exempts(mask) {
            return false;
        }
        let matched = if path.len() > MAX_STRLEN {
            let mut bounded = path.to_string();
            truncate_to_boundary(&mut bounded, MAX_STRLEN);
            self.regex.is_match(&bounded)
        } else {
            self.regex.is_match(path)
        };
        matched != (self.sense == FilterSense::IncludeOnly)
    }

    fn exempts(&self, mask: EventMask) -> bool {
        self.recursive_aware
            && mask.contains(EventMask::ISDIR)
            && mask.intersects(EventMask::CREATE | EventMask::MOVED_TO)
    }
}
