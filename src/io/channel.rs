//! Non-blocking buffered reader/writer over one descriptor.
//!
//! An [`AsyncChannel`] never polls on its own. The owner watches the
//! descriptor (usually through an [`EventLoop`](crate::EventLoop) descriptor
//! callback) and calls [`AsyncChannel::receive`] when it is readable and
//! [`AsyncChannel::flush`] when it is writable, or simply
//! [`AsyncChannel::on_ready`] with the readiness mask.
//!
//! Output that the descriptor cannot take right away is queued, up to the
//! `overflow` threshold. Whenever a flush leaves bytes behind, the stall
//! callback learns how many are still pending, which is the cue to start
//! watching for writability.
//!
//! Input is accumulated until at least `min` bytes are buffered, then handed
//! to the read callback in pieces of at most `max` bytes. Without a read
//! callback, incoming bytes are read and dropped so the descriptor never
//! backs up.

use crate::buffer::DynamicBuffer;
use crate::error::{Error, Result};
use crate::io::sys::{sys_read, sys_readv, sys_set_nonblocking, sys_writev};
use crate::reactor::Interest;

use std::fmt;
use std::io;
use std::os::fd::RawFd;

/// Chunk size used for the pending output and input queues.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Pending output above this many bytes is rejected.
pub const DEFAULT_OVERFLOW: usize = 10_000_000;

/// Reads performed by one [`AsyncChannel::receive`] call before yielding.
const MAX_READS_PER_RECEIVE: usize = 16;

/// Invoked with the number of bytes still pending after an incomplete flush.
pub type StallCallback = Box<dyn FnMut(&mut AsyncChannel, usize)>;

/// Invoked with each delivered slice of input. The channel is handed back so
/// the callback can reply on it.
pub type ReadCallback = Box<dyn FnMut(&mut AsyncChannel, &[u8])>;

/// Outcome of a [`AsyncChannel::receive`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receive {
    /// This many bytes were read from the descriptor.
    Read(usize),
    /// The descriptor had nothing to offer.
    Pending,
    /// The peer closed its end.
    Closed,
}

/// Buffered non-blocking reader/writer over one descriptor.
pub struct AsyncChannel {
    fd: RawFd,
    output: DynamicBuffer,
    input: DynamicBuffer,
    min: usize,
    max: usize,
    stall: Option<StallCallback>,
    read: Option<ReadCallback>,
    /// Set when a callback is replaced or cleared while it runs.
    stall_replaced: bool,
    read_replaced: bool,
    scratch: Vec<u8>,
}

impl AsyncChannel {
    /// Wraps `fd` with the default chunk size and overflow threshold,
    /// switching it to non-blocking mode. The channel never closes `fd`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for a negative descriptor and
    /// [`Error::Io`] if its flags cannot be changed.
    pub fn new(fd: RawFd) -> Result<Self> {
        Self::with_config(fd, DEFAULT_CHUNK_SIZE, DEFAULT_OVERFLOW)
    }

    pub(crate) fn with_config(fd: RawFd, chunk_size: usize, overflow: usize) -> Result<Self> {
        if fd < 0 {
            return Err(Error::InvalidArgument("descriptor must not be negative"));
        }
        sys_set_nonblocking(fd)?;

        Ok(Self {
            fd,
            output: DynamicBuffer::with_limit(chunk_size, overflow)?,
            input: DynamicBuffer::with_limit(chunk_size, overflow)?,
            min: 1,
            max: 0,
            stall: None,
            read: None,
            stall_replaced: false,
            read_replaced: false,
            scratch: Vec::new(),
        })
    }

    /// The wrapped descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Bytes queued for the descriptor but not yet written.
    pub fn pending(&self) -> usize {
        self.output.len()
    }

    /// Bytes read from the descriptor but not yet delivered.
    pub fn buffered(&self) -> usize {
        self.input.len()
    }

    /// Whether the owner should watch the descriptor for writability.
    pub fn wants_write(&self) -> bool {
        !self.output.is_empty()
    }

    /// Current overflow threshold; zero means unlimited.
    pub fn overflow(&self) -> usize {
        self.output.limit()
    }

    /// Changes the overflow threshold; zero disables it.
    pub fn set_overflow(&mut self, overflow: usize) {
        self.output.set_limit(overflow);
        self.input.set_limit(overflow);
    }

    /// Sets the callback told how many bytes are left after an incomplete
    /// flush.
    pub fn set_stall_callback(&mut self, callback: impl FnMut(&mut AsyncChannel, usize) + 'static) {
        self.stall = Some(Box::new(callback));
        self.stall_replaced = true;
    }

    /// Sets the callback receiving input once the read minimum is reached.
    pub fn set_read_callback(&mut self, callback: impl FnMut(&mut AsyncChannel, &[u8]) + 'static) {
        self.read = Some(Box::new(callback));
        self.read_replaced = true;
    }

    /// Removes the read callback; input arriving afterwards is discarded.
    pub fn clear_read_callback(&mut self) {
        self.read = None;
        self.read_replaced = true;
    }

    /// Current `(min, max)` delivery thresholds.
    pub fn read_limits(&self) -> (usize, usize) {
        (self.min, self.max)
    }

    /// The read callback fires once `min` bytes are buffered and receives at
    /// most `max` bytes per call, or everything buffered when `max` is zero.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] when `min` is zero, when a non-zero
    /// `max` is below `min`, or when `min` exceeds the overflow threshold.
    pub fn set_read_limits(&mut self, min: usize, max: usize) -> Result<()> {
        if min == 0 {
            return Err(Error::InvalidArgument("read minimum must be at least 1"));
        }
        if max != 0 && max < min {
            return Err(Error::InvalidArgument("read maximum is below the minimum"));
        }
        if self.input.limit() != 0 && min > self.input.limit() {
            return Err(Error::InvalidArgument("read minimum exceeds the overflow threshold"));
        }

        self.min = min;
        self.max = max;

        Ok(())
    }

    /// Queues `data` and immediately tries to flush. Returns the number of
    /// bytes still pending afterwards.
    ///
    /// # Errors
    /// - [`Error::Overflow`] when the pending output would exceed the
    ///   threshold; nothing is queued in that case.
    /// - [`Error::Io`] when the descriptor reports a hard write error.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.output.write(data)?;

        self.flush()
    }

    /// Writes as much pending output as the descriptor accepts without
    /// blocking, then reports a stall if anything is left. Returns the number
    /// of bytes still pending.
    ///
    /// # Errors
    /// Returns [`Error::Io`] for anything other than an interrupted or
    /// would-block write. Bytes not written stay queued.
    pub fn flush(&mut self) -> Result<usize> {
        while !self.output.is_empty() {
            let spans = self.output.read_lock(self.output.len())?;
            let result = sys_writev(self.fd, &spans);
            drop(spans);

            match result {
                Ok(0) => {
                    self.output.read_unlock(0)?;
                    break;
                }
                Ok(n) => {
                    self.output.read_unlock(n)?;
                    tracing::trace!(fd = self.fd, written = n, "channel flushed");
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                    self.output.read_unlock(0)?;
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    self.output.read_unlock(0)?;
                    break;
                }
                Err(err) => {
                    self.output.read_unlock(0)?;
                    tracing::warn!(fd = self.fd, error = %err, "channel write failed");
                    return Err(err.into());
                }
            }
        }

        let pending = self.output.len();
        if pending > 0 {
            tracing::trace!(fd = self.fd, pending, "channel stalled");
            self.notify_stall(pending);
        }

        Ok(self.output.len())
    }

    /// Reads what the descriptor has to offer and delivers buffered input to
    /// the read callback while at least `min` bytes are available.
    ///
    /// # Errors
    /// - [`Error::Overflow`] when the input queue is full.
    /// - [`Error::Io`] for a hard read error.
    pub fn receive(&mut self) -> Result<Receive> {
        let mut total = 0;
        let mut closed = false;

        for _ in 0..MAX_READS_PER_RECEIVE {
            let (requested, read) = if self.read.is_some() {
                self.fill_input()?
            } else {
                self.discard_input()?
            };

            match read {
                None => break,
                Some(0) => {
                    closed = true;
                    break;
                }
                Some(n) => {
                    total += n;
                    self.deliver()?;
                    if n < requested {
                        break;
                    }
                }
            }
        }

        Ok(match (total, closed) {
            (0, true) => Receive::Closed,
            (0, false) => Receive::Pending,
            (n, _) => Receive::Read(n),
        })
    }

    /// Dispatches on a readiness mask: readable (or hung up) input is
    /// received, writability flushes pending output.
    ///
    /// # Errors
    /// Propagates errors from [`receive`](Self::receive) and
    /// [`flush`](Self::flush).
    pub fn on_ready(&mut self, readiness: Interest) -> Result<Receive> {
        let mut outcome = Receive::Pending;

        if readiness.intersects(Interest::READABLE | Interest::HANGUP) {
            outcome = self.receive()?;
        }
        if readiness.contains(Interest::WRITABLE) {
            self.flush()?;
        }

        Ok(outcome)
    }

    /// One `readv` into the input queue. Returns the requested length and the
    /// bytes read, `None` meaning the descriptor would block.
    fn fill_input(&mut self) -> Result<(usize, Option<usize>)> {
        let chunk_size = self.input.chunk_size();
        let room = match self.input.limit() {
            0 => chunk_size,
            limit => limit.saturating_sub(self.input.len()).min(chunk_size),
        };
        if room == 0 {
            return Err(Error::Overflow {
                requested: self.input.len() + 1,
                limit: self.input.limit(),
            });
        }

        loop {
            let mut spans = self.input.write_lock(room)?;
            let result = sys_readv(self.fd, &mut spans);
            drop(spans);

            match result {
                Ok(n) => {
                    self.input.write_unlock(n)?;
                    return Ok((room, Some(n)));
                }
                Err(err) => {
                    self.input.write_unlock(0)?;
                    match err.kind() {
                        io::ErrorKind::Interrupted => continue,
                        io::ErrorKind::WouldBlock => return Ok((room, None)),
                        _ => {
                            tracing::warn!(fd = self.fd, error = %err, "channel read failed");
                            return Err(err.into());
                        }
                    }
                }
            }
        }
    }

    fn discard_input(&mut self) -> Result<(usize, Option<usize>)> {
        let mut sink = [0u8; DEFAULT_CHUNK_SIZE];

        loop {
            match sys_read(self.fd, &mut sink) {
                Ok(n) => {
                    if n > 0 {
                        tracing::trace!(fd = self.fd, dropped = n, "no reader, input discarded");
                    }
                    return Ok((sink.len(), Some(n)));
                }
                Err(err) => match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => return Ok((sink.len(), None)),
                    _ => return Err(err.into()),
                },
            }
        }
    }

    /// Runs the stall callback with the channel handed to it. A flush from
    /// inside the callback does not report the stall again.
    fn notify_stall(&mut self, pending: usize) {
        let Some(mut callback) = self.stall.take() else {
            return;
        };
        self.stall_replaced = false;

        callback(self, pending);

        if !self.stall_replaced {
            self.stall = Some(callback);
        }
    }

    /// Hands buffered input to the read callback while at least `min` bytes
    /// are available. The callback may write to, or reconfigure, this
    /// channel; replacing or clearing the callback ends the delivery.
    fn deliver(&mut self) -> Result<()> {
        let Some(mut callback) = self.read.take() else {
            return Ok(());
        };
        self.read_replaced = false;
        let mut scratch = std::mem::take(&mut self.scratch);

        let mut result = Ok(());
        while !self.read_replaced && self.input.len() >= self.min {
            let take = match self.max {
                0 => self.input.len(),
                max => max.min(self.input.len()),
            };

            scratch.resize(take, 0);
            match self.input.read(&mut scratch[..take]) {
                Ok(n) => callback(self, &scratch[..n]),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }

        self.scratch = scratch;
        if !self.read_replaced {
            self.read = Some(callback);
        }

        result
    }
}

impl fmt::Debug for AsyncChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncChannel")
            .field("fd", &self.fd)
            .field("pending", &self.output.len())
            .field("buffered", &self.input.len())
            .field("min", &self.min)
            .field("max", &self.max)
            .field("stall", &self.stall.is_some())
            .field("read", &self.read.is_some())
            .finish()
    }
}
