//! Error type shared by every component of the crate.
//!
//! Failures fall into four groups:
//!
//! - invalid arguments, rejected at the API boundary ([`Error::InvalidArgument`]);
//! - resource exhaustion, such as a buffer or channel growing past its limit
//!   ([`Error::Overflow`]);
//! - protocol and state violations, which point at a caller bug rather than
//!   at the environment ([`Error::Locked`], [`Error::NotLocked`],
//!   [`Error::UnlockExceeds`], [`Error::AlreadyRunning`],
//!   [`Error::NotRegistered`]);
//! - operating system failures ([`Error::Io`]).
//!
//! Transient conditions (`EINTR`, `EAGAIN`) are retried or absorbed internally
//! and never show up here.

use std::io;
use std::os::fd::RawFd;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A registration that an operation expected to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watch {
    /// A descriptor watch.
    Descriptor(RawFd),
    /// A signal watch.
    Signal(i32),
}

impl std::fmt::Display for Watch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Watch::Descriptor(fd) => write!(f, "descriptor {fd}"),
            Watch::Signal(signo) => write!(f, "signal {signo}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// An argument was null, zero or negative where that is not allowed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Accepting the data would grow a buffer past its configured limit.
    #[error("overflow: {requested} bytes requested, limit is {limit}")]
    Overflow {
        /// Total length the buffer would have reached.
        requested: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A lock is already outstanding on the buffer.
    #[error("buffer is already locked")]
    Locked,

    /// An unlock was requested without a matching lock.
    #[error("buffer is not locked")]
    NotLocked,

    /// An unlock reported more bytes than the lock covered.
    #[error("unlock of {requested} bytes exceeds the {locked} locked bytes")]
    UnlockExceeds { locked: usize, requested: usize },

    /// `run` was called on a loop that is already running.
    #[error("event loop is already running")]
    AlreadyRunning,

    /// The descriptor or signal has no registration.
    #[error("{0} is not registered")]
    NotRegistered(Watch),

    #[error(transparent)]
    Io(#[from] io::Error),
}
