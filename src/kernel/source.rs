//! Readiness, byte-count and read primitives behind the event reader.

use std::io;
use std::os::fd::{AsFd, AsRawFd};

use crate::error::{NotifyError, Result};
use crate::reader::Timeout;

use super::Backend;

/// A byte stream of kernel event records.
///
/// The reader only needs these three operations, so tests can replay
/// recorded byte sequences (including records split across reads) without a
/// live kernel descriptor.
pub trait EventSource {
    /// Blocks until data is readable or `timeout` elapses. Returns `false` on
    /// timeout.
    fn wait(&mut self, timeout: Timeout) -> Result<bool>;

    /// Number of bytes the next read could return without blocking.
    fn pending_bytes(&mut self) -> Result<usize>;

    /// Reads as much as fits into `buf`.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl EventSource for Backend {
    fn wait(&mut self, timeout: Timeout) -> Result<bool> {
        let mut pollfd = libc::pollfd {
            fd: self.as_fd().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let ret = unsafe { libc::poll(&mut pollfd, 1, timeout.as_poll_millis()) };
        if ret < 0 {
            return Err(wait_error(io::Error::last_os_error()));
        }
        Ok(ret > 0)
    }

    fn pending_bytes(&mut self) -> Result<usize> {
        let mut available: libc::c_int = 0;
        let ret = unsafe { libc::ioctl(self.as_fd().as_raw_fd(), libc::FIONREAD, &mut available) };
        if ret < 0 {
            return Err(NotifyError::Read(io::Error::last_os_error()));
        }
        Ok(usize::try_from(available).unwrap_or(0))
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        let ret = unsafe {
            libc::read(
                self.as_fd().as_raw_fd(),
                buf.as_mut_ptr().cast::<libc::c_void>(),
                buf.len(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            return Err(if err.kind() == io::ErrorKind::Interrupted {
                NotifyError::Interrupted
            } else {
                NotifyError::Read(err)
            });
        }
        Ok(ret as usize)
    }
}

fn wait_error(err: io::Error) -> NotifyError {
    if err.kind() == io::ErrorKind::Interrupted {
        NotifyError::Interrupted
    } else {
        NotifyError::Wait(err)
    }
}

/// Replays a fixed list of reads. Each chunk becomes readable only after the
/// previous one has been consumed.
#[cfg(test)]
pub(crate) struct ScriptedSource {
    chunks: std::collections::VecDeque<Vec<u8>>,
    pub reads: usize,
}

#[cfg(test)]
impl ScriptedSource {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            reads: 0,
        }
    }
}

#[cfg(test)]
impl EventSource for ScriptedSource {
    fn wait(&mut self, _timeout: Timeout) -> Result<bool> {
        Ok(!self.chunks.is_empty())
    }

    fn pending_bytes(&mut self) -> Result<usize> {
        Ok(self.chunks.front().map_or(0, Vec::len))
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.reads += 1;
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        if chunk.len() > buf.len() {
            let rest = chunk.split_off(buf.len());
            self.chunks.push_front(rest);
        }
        buf[..chunk.len()].copy_from_slice(&chunk);
        Ok(chunk.len())
    }
}
