//! How long a read may wait for the kernel.

use std::time::Duration;

/// How long [`crate::Registry::next_event`] may block waiting for the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Check once and return immediately.
    NoWait,
    /// Wait at most this long.
    Bounded(Duration),
    /// Wait until an event arrives or a signal interrupts the wait.
    #[default]
    BlockForever,
}

impl Timeout {
    /// Maps the classic seconds convention: negative blocks forever, zero
    /// returns immediately, positive waits that many seconds.
    pub fn from_secs(secs: i64) -> Self {
        match secs {
            s if s < 0 => Timeout::BlockForever,
            0 => Timeout::NoWait,
            s => Timeout::Bounded(Duration::from_secs(s.unsigned_abs())),
        }
    }

    /// Timeout argument for `poll(2)`.
    pub fn as_poll_millis(self) -> libc::c_int {
        match self {
            Timeout::NoWait => 0,
            Timeout::BlockForever => -1,
            Timeout::Bounded(duration) => {
                // round up so a sub-millisecond wait does not become a poll
                let millis = duration.as_nanos().div_ceil(1_000_000);
                libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_convention() {
        assert_eq!(Timeout::from_secs(-1), Timeout::BlockForever);
        assert_eq!(Timeout::from_secs(0), Timeout::NoWait);
        assert_eq!(
            Timeout::from_secs(3),
            Timeout::Bounded(Duration::from_secs(3))
        );
    }

    #[test]
    fn poll_millis() {
        assert_eq!(Timeout::NoWait.as_poll_millis(), 0);
        assert_eq!(Timeout::BlockForever.as_poll_millis(), -1);
        assert_eq!(Timeout::Bounded(Duration::from_micros(10)).as_poll_millis(), 1);
        assert_eq!(Timeout::Bounded(Duration::from_secs(2)).as_poll_millis(), 2000);
        assert_eq!(
            Timeout::Bounded(Duration::from_secs(u64::MAX)).as_poll_millis(),
            libc::c_int::MAX
        );
    }
}
