//! Chunked byte buffer with zero-copy lock/unlock access.
//!
//! A [`DynamicBuffer`] stores bytes in a queue of fixed-size chunks. The
//! oldest chunk is the next one to read from, the newest one is the current
//! write target.
//!
//! The copying [`DynamicBuffer::write`] and [`DynamicBuffer::read`] calls are
//! thin wrappers around the lock/unlock pairs, which hand out borrowed spans
//! of the chunks themselves so that vectored I/O (`readv`/`writev`) can move
//! data without an intermediate copy:
//!
//! ```
//! use eventcore::DynamicBuffer;
//!
//! let mut buffer = DynamicBuffer::new(4).unwrap();
//! buffer.write(b"hello world").unwrap();
//!
//! let spans = buffer.read_lock(usize::MAX).unwrap();
//! assert_eq!(spans.len(), 3);
//! drop(spans);
//!
//! // Only five bytes made it out, the rest stays buffered.
//! buffer.read_unlock(5).unwrap();
//! assert_eq!(buffer.len(), 6);
//! ```
//!
//! Only one lock may be outstanding at a time. The spans borrow the buffer, so
//! the compiler already prevents a second lock while they are alive; the
//! buffer additionally tracks the lock until the matching unlock call reports
//! how many bytes were really transferred.

mod chunk;

use crate::error::{Error, Result};
use chunk::Chunk;

use std::collections::VecDeque;
use std::fmt;
use std::io::{IoSlice, IoSliceMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lock {
    Unlocked,
    Read {
        len: usize,
    },
    Write {
        len: usize,
        /// Index of the first chunk covered by the lock.
        first: usize,
        /// Index of the first chunk allocated by the lock.
        fresh: usize,
    },
}

/// Growable byte queue built from fixed-size chunks.
pub struct DynamicBuffer {
    chunks: VecDeque<Chunk>,
    chunk_size: usize,
    len: usize,
    limit: usize,
    lock: Lock,
}

impl DynamicBuffer {
    /// Creates an unlimited buffer allocating chunks of `chunk_size` bytes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] when `chunk_size` is zero.
    pub fn new(chunk_size: usize) -> Result<Self> {
        Self::with_limit(chunk_size, 0)
    }

    /// Creates a buffer that rejects writes growing it past `limit` bytes.
    /// A `limit` of zero means unlimited.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] when `chunk_size` is zero.
    pub fn with_limit(chunk_size: usize, limit: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidArgument("chunk size must be positive"));
        }

        Ok(Self {
            chunks: VecDeque::new(),
            chunk_size,
            len: 0,
            limit,
            lock: Lock::Unlocked,
        })
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether there is nothing left to read.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity of every chunk, fixed at construction.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks currently allocated.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Size limit; zero means unlimited.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Changes the limit. Bytes already stored are kept even if they exceed it.
    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Whether a read or write lock is outstanding.
    pub fn is_locked(&self) -> bool {
        self.lock != Lock::Unlocked
    }

    /// Whether adding `add_len` bytes would exceed the limit.
    pub fn will_overflow(&self, add_len: usize) -> bool {
        self.limit != 0 && self.len.saturating_add(add_len) > self.limit
    }

    /// Drops every stored byte and chunk.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] while a lock is outstanding.
    pub fn clear(&mut self) -> Result<()> {
        if self.is_locked() {
            return Err(Error::Locked);
        }

        self.chunks.clear();
        self.len = 0;

        Ok(())
    }

    /// Appends a copy of `data`.
    ///
    /// # Errors
    /// Fails like [`write_lock`](Self::write_lock); the buffer is left
    /// untouched in that case.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut spans = self.write_lock(data.len())?;

        let mut offset = 0;
        for span in spans.iter_mut() {
            let n = span.len();
            span.copy_from_slice(&data[offset..offset + n]);
            offset += n;
        }
        drop(spans);

        self.write_unlock(data.len())
    }

    /// Moves up to `into.len()` bytes out of the buffer and returns how many
    /// were copied.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] while a lock is outstanding.
    pub fn read(&mut self, into: &mut [u8]) -> Result<usize> {
        let spans = self.read_lock(into.len())?;

        let mut offset = 0;
        for span in &spans {
            into[offset..offset + span.len()].copy_from_slice(span);
            offset += span.len();
        }
        drop(spans);

        self.read_unlock(offset)?;

        Ok(offset)
    }

    /// Reserves `len` bytes of writable space and returns it as spans over
    /// the internal chunks, filling free space in the current write target
    /// first and allocating new chunks as needed.
    ///
    /// The reservation stays pending until [`write_unlock`](Self::write_unlock)
    /// commits the bytes that were actually written.
    ///
    /// # Errors
    /// - [`Error::Locked`] when a lock is already outstanding.
    /// - [`Error::Overflow`] when `len` more bytes would exceed the limit.
    pub fn write_lock(&mut self, len: usize) -> Result<Vec<IoSliceMut<'_>>> {
        if self.is_locked() {
            return Err(Error::Locked);
        }
        if self.will_overflow(len) {
            return Err(Error::Overflow {
                requested: self.len.saturating_add(len),
                limit: self.limit,
            });
        }

        if let Some(tail) = self.chunks.back_mut()
            && tail.is_drained()
        {
            tail.rewind();
        }

        let first = match self.chunks.back() {
            Some(tail) if tail.writable() > 0 => self.chunks.len() - 1,
            _ => self.chunks.len(),
        };
        let fresh = self.chunks.len();

        let mut available = self.chunks.get(first).map_or(0, Chunk::writable);
        while available < len {
            self.chunks.push_back(Chunk::new(self.chunk_size));
            available += self.chunk_size;
        }

        self.lock = Lock::Write { len, first, fresh };

        let mut remaining = len;
        let spans = self
            .chunks
            .range_mut(first..)
            .map_while(|chunk| {
                if remaining == 0 {
                    return None;
                }
                let spare = chunk.spare_mut();
                let take = spare.len().min(remaining);
                remaining -= take;

                Some(IoSliceMut::new(&mut spare[..take]))
            })
            .collect();

        Ok(spans)
    }

    /// Commits `written` bytes of the outstanding write lock and releases it.
    ///
    /// `written` may be smaller than the locked length, for example after a
    /// short `readv`. Chunks allocated by the lock that received no data are
    /// released again.
    ///
    /// # Errors
    /// - [`Error::NotLocked`] when no write lock is outstanding.
    /// - [`Error::UnlockExceeds`] when `written` exceeds the locked length;
    ///   the lock stays in place.
    pub fn write_unlock(&mut self, written: usize) -> Result<()> {
        let Lock::Write { len, first, fresh } = self.lock else {
            return Err(Error::NotLocked);
        };
        if written > len {
            return Err(Error::UnlockExceeds {
                locked: len,
                requested: written,
            });
        }

        let mut remaining = written;
        for chunk in self.chunks.range_mut(first..) {
            if remaining == 0 {
                break;
            }
            let n = chunk.writable().min(remaining);
            chunk.commit(n);
            remaining -= n;
        }
        self.len += written;

        while self.chunks.len() > fresh && self.chunks.back().is_some_and(Chunk::is_unused) {
            self.chunks.pop_back();
        }

        self.lock = Lock::Unlocked;

        Ok(())
    }

    /// Returns spans covering the first `min(len, self.len())` unread bytes
    /// without copying them.
    ///
    /// # Errors
    /// Returns [`Error::Locked`] when a lock is already outstanding.
    pub fn read_lock(&mut self, len: usize) -> Result<Vec<IoSlice<'_>>> {
        if self.is_locked() {
            return Err(Error::Locked);
        }

        let len = len.min(self.len);
        self.lock = Lock::Read { len };

        let mut remaining = len;
        let spans = self
            .chunks
            .iter()
            .map_while(|chunk| {
                if remaining == 0 {
                    return None;
                }
                let filled = chunk.filled();
                let take = filled.len().min(remaining);
                remaining -= take;

                Some(IoSlice::new(&filled[..take]))
            })
            .collect();

        Ok(spans)
    }

    /// Removes `read` bytes from the front and releases the read lock.
    ///
    /// # Errors
    /// - [`Error::NotLocked`] when no read lock is outstanding.
    /// - [`Error::UnlockExceeds`] when `read` exceeds the locked length;
    ///   the lock stays in place.
    pub fn read_unlock(&mut self, read: usize) -> Result<()> {
        let Lock::Read { len } = self.lock else {
            return Err(Error::NotLocked);
        };
        if read > len {
            return Err(Error::UnlockExceeds {
                locked: len,
                requested: read,
            });
        }

        self.consume(read);
        self.lock = Lock::Unlocked;

        Ok(())
    }

    fn consume(&mut self, len: usize) {
        let mut remaining = len;
        while remaining > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            let take = front.readable().min(remaining);
            front.consume(take);
            remaining -= take;

            if front.is_drained() && self.chunks.len() > 1 {
                self.chunks.pop_front();
            } else if take == 0 {
                break;
            }
        }
        self.len -= len - remaining;

        // The last chunk is the write target: keep it for reuse.
        if let Some(tail) = self.chunks.back_mut()
            && tail.is_drained()
        {
            tail.rewind();
        }
    }
}

impl fmt::Debug for DynamicBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicBuffer")
            .field("len", &self.len)
            .field("chunk_size", &self.chunk_size)
            .field("chunks", &self.chunks.len())
            .field("limit", &self.limit)
            .field("lock", &self.lock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_before_the_tail_are_always_full() {
        let mut buffer = DynamicBuffer::new(10).unwrap();
        buffer.write(&[1; 7]).unwrap();
        buffer.write(&[2; 7]).unwrap();
        buffer.write(&[3; 7]).unwrap();

        let count = buffer.chunks.len();
        for chunk in buffer.chunks.range(..count - 1) {
            assert_eq!(chunk.writable(), 0);
        }
        assert_eq!(buffer.len(), 21);
    }

    #[test]
    fn test_partial_write_unlock_trims_unused_chunks() {
        let mut buffer = DynamicBuffer::new(10).unwrap();
        let spans = buffer.write_lock(35).unwrap();
        assert_eq!(spans.len(), 4);
        drop(spans);
        assert_eq!(buffer.chunks.len(), 4);

        buffer.write_unlock(12).unwrap();
        assert_eq!(buffer.chunks.len(), 2);
        assert_eq!(buffer.len(), 12);
    }

    #[test]
    fn test_drained_tail_is_rewound_not_freed() {
        let mut buffer = DynamicBuffer::new(10).unwrap();
        buffer.write(&[9; 10]).unwrap();
        let mut out = [0u8; 10];
        assert_eq!(buffer.read(&mut out).unwrap(), 10);

        assert_eq!(buffer.chunks.len(), 1);
        assert!(buffer.chunks[0].is_unused());
    }
}
