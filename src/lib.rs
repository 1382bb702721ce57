//! Single-threaded, callback-driven event loop with buffered non-blocking I/O.
//!
//! This crate multiplexes readiness on raw file descriptors, POSIX signals and
//! application timers behind one loop, and provides overflow-bounded buffered
//! I/O on top of non-blocking descriptors.
//!
//! # Architecture
//!
//! - **DynamicBuffer**: chunked byte queue with zero-copy lock/unlock spans
//! - **AsyncChannel**: non-blocking write queue with stall notification and
//!   threshold-gated read delivery
//! - **Scheduler**: time-ordered one-shot and periodic events
//! - **EventLoop**: one `poll`/`ppoll` per iteration over descriptors, the
//!   signal descriptor and the earliest timer
//! - **EventLoopBuilder** / **ChannelBuilder**: construction-time knobs
//!
//! # Example
//! ```no_run
//! use eventcore::{Continuation, EventId, EventLoop, Handler};
//! use std::time::Duration;
//!
//! let mut event_loop = EventLoop::new();
//! event_loop
//!     .schedule_once_after(
//!         Duration::from_millis(10),
//!         EventId(1),
//!         Handler::new(|_, _| Continuation::Stop),
//!     )
//!     .unwrap();
//!
//! event_loop.run().unwrap();
//! ```

pub mod buffer;
mod builder;
pub mod error;
pub mod io;
pub mod reactor;
pub mod time;

pub use buffer::DynamicBuffer;
pub use builder::{ChannelBuilder, EventLoopBuilder};
pub use error::{Error, Result, Watch};
pub use io::{AsyncChannel, DEFAULT_CHUNK_SIZE, DEFAULT_OVERFLOW, Receive};
pub use reactor::{
    Callback, Continuation, EventLoop, Handler, Interest, LoopState, SignalStrategy, Trigger,
};
pub use time::{Cycles, Due, Event, EventId, EventKey, EventState, Schedule, Scheduler};
