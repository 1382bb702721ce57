//! Timed events and the scheduler that orders them.
//!
//! - [`event`]: the [`Event`] type and its identifiers
//! - [`scheduler`]: the time-ordered [`Scheduler`]
//!
//! The scheduler has no notion of an event loop. The
//! [`EventLoop`](crate::EventLoop) owns one and asks it for the next wait
//! interval on every iteration.

pub mod event;
pub mod scheduler;

pub use event::{Cycles, Event, EventId, EventKey, EventState, Schedule};
pub use scheduler::{Due, Scheduler};
