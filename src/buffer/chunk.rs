//! Fixed-capacity storage block used by [`DynamicBuffer`](super::DynamicBuffer).

use std::fmt;

/// A fixed-size byte block with independent read and write cursors.
///
/// Bytes in `start..end` are unread, bytes in `end..capacity` are free.
/// Cursors only move forward until the chunk is rewound.
pub(crate) struct Chunk {
    data: Box<[u8]>,
    start: usize,
    end: usize,
}

impl Chunk {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
        }
    }

    pub(crate) fn readable(&self) -> usize {
        self.end - self.start
    }

    pub(crate) fn writable(&self) -> usize {
        self.data.len() - self.end
    }

    /// Every written byte has been read.
    pub(crate) fn is_drained(&self) -> bool {
        self.start == self.end
    }

    /// Nothing was ever written since allocation or the last rewind.
    pub(crate) fn is_unused(&self) -> bool {
        self.end == 0
    }

    pub(crate) fn filled(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }

    pub(crate) fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.end..]
    }

    pub(crate) fn commit(&mut self, len: usize) {
        debug_assert!(len <= self.writable());
        self.end += len;
    }

    pub(crate) fn consume(&mut self, len: usize) {
        debug_assert!(len <= self.readable());
        self.start += len;
    }

    /// Moves both cursors back to the beginning. Only valid once drained.
    pub(crate) fn rewind(&mut self) {
        debug_assert!(self.is_drained());
        self.start = 0;
        self.end = 0;
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("capacity", &self.data.len())
            .field("start", &self.start)
            .field("end", &self.end)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursors_track_commit_and_consume() {
        let mut chunk = Chunk::new(8);
        assert!(chunk.is_unused());
        assert_eq!(chunk.writable(), 8);

        chunk.spare_mut()[..3].copy_from_slice(b"abc");
        chunk.commit(3);
        assert_eq!(chunk.filled(), b"abc");
        assert_eq!(chunk.writable(), 5);

        chunk.consume(2);
        assert_eq!(chunk.filled(), b"c");
        assert!(!chunk.is_drained());

        chunk.consume(1);
        assert!(chunk.is_drained());
        assert!(!chunk.is_unused());
    }

    #[test]
    fn test_rewind_restores_full_capacity() {
        let mut chunk = Chunk::new(4);
        chunk.commit(4);
        chunk.consume(4);
        assert_eq!(chunk.writable(), 0);

        chunk.rewind();
        assert_eq!(chunk.writable(), 4);
        assert!(chunk.is_unused());
    }
}
