//! Readiness-driven event loop.
//!
//! This module ties descriptor readiness, signal delivery and scheduled timers
//! into one callback-driven loop built on `poll`/`ppoll`.
//! It includes:
//! - [`core`]: the [`EventLoop`] itself
//! - [`event`]: readiness masks and the blocking wait
//! - `signal`: signals turned into descriptor readiness
//!
//! Everything a callback needs to know about why it runs is in its
//! [`Trigger`]; what it wants next is its returned [`Continuation`].

pub mod core;
pub mod event;
mod signal;

pub use self::core::{EventLoop, LoopState};
pub use event::Interest;
pub use signal::SignalStrategy;

use crate::time::{EventId, EventKey};

use std::cell::RefCell;
use std::fmt;
use std::os::fd::RawFd;
use std::rc::Rc;

/// What a callback asks the loop to do once it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuation {
    /// Keep running.
    #[default]
    Continue,
    /// Stop after the current dispatch batch.
    Stop,
}

/// Why a callback was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A watched descriptor is ready; `readiness` is what the OS reported.
    Descriptor { fd: RawFd, readiness: Interest },
    /// A watched signal was delivered.
    Signal(i32),
    /// A timer fired.
    Timer { key: EventKey, id: EventId },
}

pub type Callback = Rc<RefCell<dyn FnMut(&mut EventLoop, Trigger) -> Continuation>>;

/// Callback attached to a watch or timer.
///
/// [`Handler::Default`] defers to the loop's default callback at dispatch
/// time, so changing the default affects existing watches too. Cloning a
/// handler shares the same closure.
#[derive(Clone, Default)]
pub enum Handler {
    #[default]
    Default,
    Callback(Callback),
}

impl Handler {
    /// Wraps a closure as a callback handler.
    pub fn new(callback: impl FnMut(&mut EventLoop, Trigger) -> Continuation + 'static) -> Self {
        Handler::Callback(Rc::new(RefCell::new(callback)))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Default => f.write_str("Handler::Default"),
            Handler::Callback(_) => f.write_str("Handler::Callback(..)"),
        }
    }
}
