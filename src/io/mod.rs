//! Buffered non-blocking I/O over raw descriptors.
//!
//! - [`channel`]: the [`AsyncChannel`] write queue and thresholded reader
//! - `sys`: syscall wrappers shared with the reactor

pub mod channel;
pub(crate) mod sys;

pub use channel::{AsyncChannel, DEFAULT_CHUNK_SIZE, DEFAULT_OVERFLOW, Receive};
