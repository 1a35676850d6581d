//! Raw record reader.
//!
//! [`EventReader::next_record`] hands out one complete kernel record at a
//! time. Records already buffered are drained first; otherwise the reader
//! waits for readiness, lets the kernel queue fill up to the caller's batch
//! hint, and performs a single read. A record whose tail has not arrived yet
//! is moved to the front of the buffer and completed by the next read, so a
//! torn record is never returned.

mod buffer;
mod timeout;

pub use buffer::EventBuffer;
pub use timeout::Timeout;

use crate::error::{NotifyError, Result};
use crate::kernel::{fanotify, inotify, EventSource};

/// Events worth of buffer space, matching the kernel's default queue batch.
pub const MAX_EVENTS: usize = 4096;

/// Smallest possible record; the unit of the batch hint.
pub const MIN_RECORD_LEN: usize = inotify::HEADER_LEN;

/// Upper bound on `FIONREAD` polls while waiting for a batch to accumulate.
const FILL_SPINS: usize = 64;

/// Wire format of the records in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLayout {
    Inotify,
    Fanotify,
}

impl RecordLayout {
    /// Length of the complete record at the front of `buf`, `None` when more
    /// bytes are needed.
    pub fn record_len(self, buf: &[u8]) -> Result<Option<usize>> {
        match self {
            RecordLayout::Inotify => Ok(inotify::record_len(buf)),
            RecordLayout::Fanotify => fanotify::record_len(buf),
        }
    }
}

#[derive(Debug)]
pub struct EventReader {
    buffer: EventBuffer,
    layout: RecordLayout,
}

impl EventReader {
    pub fn new(layout: RecordLayout) -> Self {
        Self::with_capacity(layout, MAX_EVENTS * MIN_RECORD_LEN)
    }

    pub fn with_capacity(layout: RecordLayout, capacity: usize) -> Self {
        Self {
            buffer: EventBuffer::with_capacity(capacity),
            layout,
        }
    }

    /// True when at least one complete record is buffered.
    pub fn has_buffered_record(&self) -> bool {
        matches!(self.layout.record_len(self.buffer.pending()), Ok(Some(_)))
    }

    /// Returns the next complete record, or `None` when `timeout` elapsed
    /// first.
    ///
    /// `batch_hint` is advisory: the reader waits (briefly) for that many
    /// minimum-size records to be queued before reading, which lets the
    /// kernel coalesce duplicates. It never changes how many records are
    /// returned per call.
    pub fn next_record<S>(
        &mut self,
        source: &mut S,
        timeout: Timeout,
        batch_hint: usize,
    ) -> Result<Option<&[u8]>>
    where
        S: EventSource + ?Sized,
    {
        loop {
            if let Some(len) = self.layout.record_len(self.buffer.pending())? {
                return Ok(Some(self.buffer.take(len)));
            }

            self.buffer.compact();
            if self.buffer.spare() == 0 {
                return Err(NotifyError::MalformedRecord(format!(
                    "record larger than the {} byte read buffer",
                    self.buffer.capacity()
                )));
            }

            if !source.wait(timeout)? {
                return Ok(None);
            }

            let wanted = batch_hint
                .max(1)
                .saturating_mul(MIN_RECORD_LEN)
                .min(self.buffer.spare());
            for _ in 0..FILL_SPINS {
                if source.pending_bytes()? >= wanted {
                    break;
                }
                std::thread::yield_now();
            }

            let read = source.read_into(self.buffer.spare_mut())?;
            if read == 0 {
                return Err(NotifyError::QueueOverrun);
            }
            log::trace!("read {read} bytes of events");
            self.buffer.commit(read);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::inotify::{encode_record, parse_record};
    use crate::kernel::source::ScriptedSource;
    use crate::mask::EventMask;

    #[test]
    fn drains_buffered_records_before_reading_again() {
        let mut bytes = encode_record(1, EventMask::CREATE.bits(), 0, "a");
        bytes.extend(encode_record(1, EventMask::DELETE.bits(), 0, "b"));
        let mut source = ScriptedSource::new(vec![bytes]);
        let mut reader = EventReader::new(RecordLayout::Inotify);

        let first = reader
            .next_record(&mut source, Timeout::NoWait, 1)
            .unwrap()
            .map(|rec| parse_record(rec).name.to_vec());
        assert_eq!(first, Some(b"a".to_vec()));
        assert!(reader.has_buffered_record());

        let second = reader
            .next_record(&mut source, Timeout::NoWait, 1)
            .unwrap()
            .map(|rec| parse_record(rec).name.to_vec());
        assert_eq!(second, Some(b"b".to_vec()));
        assert_eq!(source.reads, 1);

        assert!(reader
            .next_record(&mut source, Timeout::NoWait, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn batch_hint_does_not_change_what_is_returned() {
        let chunks = ["one", "two", "three"]
            .iter()
            .map(|name| encode_record(3, EventMask::MODIFY.bits(), 0, name))
            .collect();
        let mut source = ScriptedSource::new(chunks);
        let mut reader = EventReader::new(RecordLayout::Inotify);

        let names: Vec<Vec<u8>> = std::iter::from_fn(|| {
            reader
                .next_record(&mut source, Timeout::NoWait, 8)
                .unwrap()
                .map(|rec| parse_record(rec).name.to_vec())
        })
        .collect();
        assert_eq!(
            names,
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
        assert_eq!(source.reads, 3);
    }

    #[test]
    fn reassembles_a_name_split_across_reads() {
        let record = encode_record(5, EventMask::CLOSE_WRITE.bits(), 0, "split-name.txt");
        let (head, tail) = record.split_at(22);
        let mut source = ScriptedSource::new(vec![head.to_vec(), tail.to_vec()]);
        let mut reader = EventReader::new(RecordLayout::Inotify);

        let rec = reader
            .next_record(&mut source, Timeout::BlockForever, 1)
            .unwrap()
            .expect("one record");
        let parsed = parse_record(rec);
        assert_eq!(parsed.wd, 5);
        assert_eq!(parsed.name, b"split-name.txt");
        assert_eq!(source.reads, 2);

        assert!(reader
            .next_record(&mut source, Timeout::NoWait, 1)
            .unwrap()
            .is_none());
    }

    #[test]
    fn completes_a_torn_record_behind_a_whole_one() {
        let first = encode_record(1, EventMask::OPEN.bits(), 0, "first");
        let second = encode_record(2, EventMask::ACCESS.bits(), 0, "second-one");
        let mut chunk = first.clone();
        chunk.extend_from_slice(&second[..10]);
        let mut source = ScriptedSource::new(vec![chunk, second[10..].to_vec()]);
        // small buffer forces the partial record to be compacted to the front
        let mut reader = EventReader::with_capacity(RecordLayout::Inotify, first.len() + 40);

        let names: Vec<Vec<u8>> = std::iter::from_fn(|| {
            reader
                .next_record(&mut source, Timeout::NoWait, 1)
                .unwrap()
                .map(|rec| parse_record(rec).name.to_vec())
        })
        .collect();
        assert_eq!(names, vec![b"first".to_vec(), b"second-one".to_vec()]);
    }

    #[test]
    fn zero_byte_read_is_a_queue_overrun() {
        let mut source = ScriptedSource::new(vec![Vec::new()]);
        let mut reader = EventReader::new(RecordLayout::Inotify);
        assert!(matches!(
            reader.next_record(&mut source, Timeout::NoWait, 1),
            Err(NotifyError::QueueOverrun)
        ));
    }

    #[test]
    fn oversized_record_is_reported() {
        let record = encode_record(1, EventMask::CREATE.bits(), 0, "a-rather-long-file-name");
        let mut source = ScriptedSource::new(vec![record]);
        let mut reader = EventReader::with_capacity(RecordLayout::Inotify, 24);
        assert!(matches!(
            reader.next_record(&mut source, Timeout::NoWait, 1),
            Err(NotifyError::MalformedRecord(_))
        ));
    }
}
