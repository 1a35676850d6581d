//! Event template rendering.
//!
//! Templates mix literal text with `%` directives:
//!
//! | directive | expands to |
//! |-----------|------------|
//! | `%w` | watched directory (the watch path up to its last `/`) |
//! | `%f` | file name the event is about |
//! | `%e` | event names joined by `,` |
//! | `%Xe` | event names joined by `X` |
//! | `%T` | current time, formatted with the configured strftime pattern |
//! | `%c` | rename cookie in hex |
//! | `%0` / `%n` | NUL / newline |
//! | `%%` | a literal `%` |
//!
//! Any other `%x` is copied through unchanged.

mod lexer;

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use logos::Logos;

use crate::error::{NotifyError, Result};
use crate::mask::EventMask;

use lexer::Token;

/// Longest template accepted and longest string produced.
pub const MAX_STRLEN: usize = 4096;

/// The per-event values a template can refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFields<'a> {
    pub dir: &'a str,
    pub name: &'a str,
    pub mask: EventMask,
    pub cookie: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Formatter {
    time_format: Option<String>,
}

impl Formatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the strftime pattern used by `%T`. `None` makes `%T` expand to
    /// nothing.
    pub fn set_time_format(&mut self, pattern: Option<&str>) -> Result<()> {
        if let Some(pattern) = pattern {
            if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
                return Err(NotifyError::InvalidTimeFormat(pattern.to_string()));
            }
        }
        self.time_format = pattern.map(str::to_string);
        Ok(())
    }

    pub fn time_format(&self) -> Option<&str> {
        self.time_format.as_deref()
    }

    pub fn render(&self, template: &str, fields: &EventFields<'_>) -> Result<String> {
        if template.is_empty() {
            return Err(NotifyError::InvalidFormat("empty template".into()));
        }
        if template.len() > MAX_STRLEN {
            return Err(NotifyError::StringTooLong {
                len: template.len(),
                max: MAX_STRLEN,
            });
        }

        let mut out = String::with_capacity(template.len() + fields.dir.len() + fields.name.len());
        for token in Token::lexer(template) {
            let token = token.map_err(|()| NotifyError::InvalidFormat(template.to_string()))?;
            match token {
                Token::Text(text) => out.push_str(text),
                Token::Percent => out.push('%'),
                Token::Nul => out.push('\0'),
                Token::Newline => out.push('\n'),
                Token::WatchedDir => out.push_str(fields.dir),
                Token::FileName => out.push_str(fields.name),
                Token::Events => out.push_str(&fields.mask.to_names()),
                Token::EventsSep(sep) => out.push_str(&fields.mask.to_names_sep(sep)),
                Token::Time => self.push_time(&mut out)?,
                Token::Cookie => {
                    let _ = write!(out, "{:x}", fields.cookie);
                }
                Token::Literal(ch) => {
                    out.push('%');
                    out.push(ch);
                }
                Token::Dangling => {
                    return Err(NotifyError::InvalidFormat(format!(
                        "template ends with '%': {template}"
                    )));
                }
            }
            if out.len() >= MAX_STRLEN {
                break;
            }
        }
        truncate_to_boundary(&mut out, MAX_STRLEN);
        Ok(out)
    }

    fn push_time(&self, out: &mut String) -> Result<()> {
        let Some(pattern) = self.time_format.as_deref() else {
            return Ok(());
        };
        write!(out, "{}", chrono::Local::now().format(pattern))
            .map_err(|_| NotifyError::InvalidTimeFormat(pattern.to_string()))
    }
}

/// Cuts `text` to at most `max` bytes without splitting a character.
pub(crate) fn truncate_to_boundary(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}
