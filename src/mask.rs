//! Event masks and their textual names.
//!
//! inotify and fanotify share bit values for every event kind this crate
//! reports (`IN_ACCESS == FAN_ACCESS`, `IN_ISDIR == FAN_ONDIR`, ...), so a
//! single mask type covers both backends.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const ACCESS        = 0x0000_0001;
        const MODIFY        = 0x0000_0002;
        const ATTRIB        = 0x0000_0004;
        const CLOSE_WRITE   = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN          = 0x0000_0020;
        const MOVED_FROM    = 0x0000_0040;
        const MOVED_TO      = 0x0000_0080;
        const CREATE        = 0x0000_0100;
        const DELETE        = 0x0000_0200;
        const DELETE_SELF   = 0x0000_0400;
        const MOVE_SELF     = 0x0000_0800;
        const UNMOUNT       = 0x0000_2000;
        const Q_OVERFLOW    = 0x0000_4000;
        const IGNORED       = 0x0000_8000;
        const ONLYDIR       = 0x0100_0000;
        const DONT_FOLLOW   = 0x0200_0000;
        const EXCL_UNLINK   = 0x0400_0000;
        const MASK_ADD      = 0x2000_0000;
        const ISDIR         = 0x4000_0000;
        const ONESHOT       = 0x8000_0000;

        const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
        const MOVE = Self::MOVED_FROM.bits() | Self::MOVED_TO.bits();
        const ALL_EVENTS = 0x0000_0fff;
    }
}

/// Names accepted by [`EventMask::parse_names`].
const PARSE_TABLE: &[(&str, EventMask)] = &[
    ("ACCESS", EventMask::ACCESS),
    ("MODIFY", EventMask::MODIFY),
    ("ATTRIB", EventMask::ATTRIB),
    ("CLOSE_WRITE", EventMask::CLOSE_WRITE),
    ("CLOSE_NOWRITE", EventMask::CLOSE_NOWRITE),
    ("OPEN", EventMask::OPEN),
    ("MOVED_FROM", EventMask::MOVED_FROM),
    ("MOVED_TO", EventMask::MOVED_TO),
    ("CREATE", EventMask::CREATE),
    ("DELETE", EventMask::DELETE),
    ("DELETE_SELF", EventMask::DELETE_SELF),
    ("UNMOUNT", EventMask::UNMOUNT),
    ("Q_OVERFLOW", EventMask::Q_OVERFLOW),
    ("IGNORED", EventMask::IGNORED),
    ("CLOSE", EventMask::CLOSE),
    ("MOVE_SELF", EventMask::MOVE_SELF),
    ("MOVE", EventMask::MOVE),
    ("ISDIR", EventMask::ISDIR),
    ("ONESHOT", EventMask::ONESHOT),
    ("ALL_EVENTS", EventMask::ALL_EVENTS),
];

/// Names emitted by [`EventMask::to_names`], in output order.
///
/// `CLOSE` is printed whenever either close bit is set.
const RENDER_TABLE: &[(&str, EventMask)] = &[
    ("ACCESS", EventMask::ACCESS),
    ("MODIFY", EventMask::MODIFY),
    ("ATTRIB", EventMask::ATTRIB),
    ("CLOSE_WRITE", EventMask::CLOSE_WRITE),
    ("CLOSE_NOWRITE", EventMask::CLOSE_NOWRITE),
    ("OPEN", EventMask::OPEN),
    ("MOVED_FROM", EventMask::MOVED_FROM),
    ("MOVED_TO", EventMask::MOVED_TO),
    ("CREATE", EventMask::CREATE),
    ("DELETE", EventMask::DELETE),
    ("DELETE_SELF", EventMask::DELETE_SELF),
    ("UNMOUNT", EventMask::UNMOUNT),
    ("Q_OVERFLOW", EventMask::Q_OVERFLOW),
    ("IGNORED", EventMask::IGNORED),
    ("CLOSE", EventMask::CLOSE),
    ("MOVE_SELF", EventMask::MOVE_SELF),
    ("ISDIR", EventMask::ISDIR),
    ("ONESHOT", EventMask::ONESHOT),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseMaskError {
    #[error("Unknown event name: {0}")]
    UnknownEvent(String),

    #[error("Invalid event separator {0:?}")]
    InvalidSeparator(char),
}

impl EventMask {
    /// Builds a mask from a kernel value, keeping bits this type has no name for.
    #[inline]
    pub fn from_raw(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }

    /// Parses a comma separated list of event names.
    pub fn parse_names(names: &str) -> Result<Self, ParseMaskError> {
        Self::parse_names_sep(names, ',')
    }

    /// Parses a `sep` separated list of event names, case-insensitively.
    ///
    /// The separator must not be a letter or `_`. Tokens are read left to
    /// right and the first bad token decides the result: an empty token
    /// (leading, doubled or trailing separator) yields the empty mask, an
    /// unrecognised token yields [`ParseMaskError::UnknownEvent`]. Empty input
    /// yields the empty mask.
    pub fn parse_names_sep(names: &str, sep: char) -> Result<Self, ParseMaskError> {
        if sep == '_' || sep.is_ascii_alphabetic() {
            return Err(ParseMaskError::InvalidSeparator(sep));
        }
        if names.is_empty() {
            return Ok(Self::empty());
        }

        let mut mask = Self::empty();
        for token in names.split(sep) {
            if token.is_empty() {
                return Ok(Self::empty());
            }
            match lookup_name(token) {
                Some(bits) => mask |= bits,
                None => return Err(ParseMaskError::UnknownEvent(token.to_string())),
            }
        }
        Ok(mask)
    }

    /// Renders the mask as comma separated event names.
    pub fn to_names(self) -> String {
        self.to_names_sep(',')
    }

    /// Renders the mask as `sep` separated event names.
    ///
    /// A mask with none of the named bits renders as `0x%08x`.
    pub fn to_names_sep(self, sep: char) -> String {
        let mut out = String::new();
        for (name, bits) in RENDER_TABLE {
            if self.intersects(*bits) {
                if !out.is_empty() {
                    out.push(sep);
                }
                out.push_str(name);
            }
        }
        if out.is_empty() {
            out = format!("0x{:08x}", self.bits());
        }
        out
    }
}

fn lookup_name(token: &str) -> Option<EventMask> {
    PARSE_TABLE
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(token))
        .map(|(_, bits)| *bits)
}
