//! Fixed-capacity byte queue for raw kernel records.

/// Bytes `[start, end)` are read from the kernel but not yet consumed.
#[derive(Debug)]
pub struct EventBuffer {
    data: Box<[u8]>,
    start: usize,
    end: usize,
}

impl EventBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    /// Unconsumed bytes.
    #[inline]
    pub fn pending(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    /// Marks `len` pending bytes consumed and returns them.
    pub fn take(&mut self, len: usize) -> &[u8] {
        debug_assert!(len <= self.end - self.start);
        let start = self.start;
        self.start += len;
        if self.start == self.end {
            // next read can start at the front again
            self.start = 0;
            self.end = 0;
        }
        &self.data[start..start + len]
    }

    /// Moves a partial record to the front so the next read lands after it.
    pub fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.data.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;
    }

    /// Free space after the pending bytes.
    #[inline]
    pub fn spare(&self) -> usize {
        self.data.len() - self.end
    }

    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    /// Records that `len` bytes were written into [`Self::spare_mut`].
    pub fn commit(&mut self, len: usize) {
        debug_assert!(len <= self.spare());
        self.end += len;
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(buf: &mut EventBuffer, bytes: &[u8]) {
        buf.spare_mut()[..bytes.len()].copy_from_slice(bytes);
        buf.commit(bytes.len());
    }

    #[test]
    fn take_advances_and_resets_when_drained() {
        let mut buf = EventBuffer::with_capacity(8);
        fill(&mut buf, b"abcdef");
        assert_eq!(buf.take(2), b"ab");
        assert_eq!(buf.pending(), b"cdef");
        assert_eq!(buf.spare(), 2);
        assert_eq!(buf.take(4), b"cdef");
        assert!(buf.pending().is_empty());
        assert_eq!(buf.spare(), 8);
    }

    #[test]
    fn compact_moves_partial_record_to_front() {
        let mut buf = EventBuffer::with_capacity(8);
        fill(&mut buf, b"abcdefg");
        buf.take(5);
        assert_eq!(buf.spare(), 1);
        buf.compact();
        assert_eq!(buf.pending(), b"fg");
        assert_eq!(buf.spare(), 6);
        fill(&mut buf, b"hi");
        assert_eq!(buf.pending(), b"fghi");
        assert_eq!(buf.capacity(), 8);
    }
}
