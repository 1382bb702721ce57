//! Fluent builders for [`EventLoop`] and [`AsyncChannel`] construction.
//!
//! Both types have sensible defaults through their `new` constructors; the
//! builders exist for the knobs that must be fixed at construction time.

use crate::error::Result;
use crate::io::channel::{ReadCallback, StallCallback};
use crate::io::{AsyncChannel, DEFAULT_CHUNK_SIZE, DEFAULT_OVERFLOW};
use crate::reactor::{Continuation, EventLoop, Handler, SignalStrategy, Trigger};

/// Builder for [`EventLoop`] instances.
///
/// # Example
/// ```
/// use eventcore::{Continuation, EventLoopBuilder, SignalStrategy};
///
/// let event_loop = EventLoopBuilder::new()
///     .signal_strategy(SignalStrategy::SelfPipe)
///     .default_callback(|_, trigger| {
///         println!("unhandled {trigger:?}");
///         Continuation::Continue
///     })
///     .build();
///
/// assert!(!event_loop.is_running());
/// ```
#[derive(Debug, Default)]
pub struct EventLoopBuilder {
    default: Handler,
    strategy: SignalStrategy,
    capacity: usize,
}

impl EventLoopBuilder {
    /// Creates a builder with no default callback, the platform's signal
    /// strategy and no capacity hint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback used by every watch registered with [`Handler::Default`].
    pub fn default_callback(
        mut self,
        callback: impl FnMut(&mut EventLoop, Trigger) -> Continuation + 'static,
    ) -> Self {
        self.default = Handler::new(callback);
        self
    }

    /// How signals reach the loop. Defaults to `signalfd` on Linux and the
    /// self-pipe elsewhere.
    pub fn signal_strategy(mut self, strategy: SignalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Number of descriptors expected to be watched at once.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Consumes the builder and returns an idle loop.
    pub fn build(self) -> EventLoop {
        EventLoop::with_config(self.default, self.strategy, self.capacity)
    }
}

/// Builder for [`AsyncChannel`] instances.
///
/// # Example
/// ```no_run
/// use eventcore::ChannelBuilder;
///
/// let channel = ChannelBuilder::new()
///     .chunk_size(16 * 1024)
///     .read_limits(4, 512)
///     .on_read(|channel, bytes| {
///         // Echo every request back on the same descriptor.
///         channel.write(bytes).unwrap();
///     })
///     .build(0)
///     .unwrap();
/// # drop(channel);
/// ```
pub struct ChannelBuilder {
    chunk_size: usize,
    overflow: usize,
    read_limits: (usize, usize),
    stall: Option<StallCallback>,
    read: Option<ReadCallback>,
}

impl Default for ChannelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelBuilder {
    /// Creates a builder with a 4096-byte chunk size, a 10,000,000-byte
    /// overflow threshold and read limits `(1, 0)`.
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overflow: DEFAULT_OVERFLOW,
            read_limits: (1, 0),
            stall: None,
            read: None,
        }
    }

    /// Size of the chunks backing both queues.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Pending output (and buffered input) limit; zero disables it.
    pub fn overflow(mut self, overflow: usize) -> Self {
        self.overflow = overflow;
        self
    }

    /// Delivery thresholds, checked by [`build`](Self::build).
    pub fn read_limits(mut self, min: usize, max: usize) -> Self {
        self.read_limits = (min, max);
        self
    }

    /// See [`AsyncChannel::set_stall_callback`].
    pub fn on_stall(mut self, callback: impl FnMut(&mut AsyncChannel, usize) + 'static) -> Self {
        self.stall = Some(Box::new(callback));
        self
    }

    /// See [`AsyncChannel::set_read_callback`].
    pub fn on_read(mut self, callback: impl FnMut(&mut AsyncChannel, &[u8]) + 'static) -> Self {
        self.read = Some(Box::new(callback));
        self
    }

    /// Wraps `fd`, switching it to non-blocking mode.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`](crate::Error::InvalidArgument) for a
    /// negative descriptor, a zero chunk size or invalid read limits;
    /// [`Error::Io`](crate::Error::Io) if the descriptor flags cannot be
    /// changed.
    pub fn build(self, fd: std::os::fd::RawFd) -> Result<AsyncChannel> {
        let mut channel = AsyncChannel::with_config(fd, self.chunk_size, self.overflow)?;

        let (min, max) = self.read_limits;
        channel.set_read_limits(min, max)?;
        if let Some(stall) = self.stall {
            channel.set_stall_callback(stall);
        }
        if let Some(read) = self.read {
            channel.set_read_callback(read);
        }

        Ok(channel)
    }
}

impl std::fmt::Debug for ChannelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBuilder")
            .field("chunk_size", &self.chunk_size)
            .field("overflow", &self.overflow)
            .field("read_limits", &self.read_limits)
            .field("stall", &self.stall.is_some())
            .field("read", &self.read.is_some())
            .finish()
    }
}
