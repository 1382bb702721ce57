//! Timed events handed to a [`Scheduler`](super::Scheduler).

use crate::error::{Error, Result};

use std::time::{Duration, Instant};

/// Caller-chosen classification tag carried by an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u32);

impl From<u32> for EventId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Handle to an event owned by a scheduler.
///
/// Keys are never reused by the scheduler that issued them, so a stale key
/// simply stops matching once its event is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey(pub(crate) u64);

/// Whether an event currently lives inside a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Owned by the caller, or already gone.
    Free,
    /// Queued in the scheduler and addressed by its [`EventKey`].
    Scheduled,
}

/// Remaining firings of a periodic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycles {
    /// Fires until deleted; never decrements.
    Infinite,
    /// Fires this many more times, the current firing included.
    Count(u32),
}

/// Whether an event fires once or repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    Once,
    Periodic { period: Duration, cycles: Cycles },
}

/// A one-shot or periodic timed event carrying `data`.
///
/// Dropping the event drops its data, which takes the place of an attached
/// destructor.
#[derive(Debug)]
pub struct Event<T> {
    time: Instant,
    id: EventId,
    data: T,
    schedule: Schedule,
}

impl<T> Event<T> {
    /// A one-shot event due at `time`.
    pub fn once(time: Instant, id: EventId, data: T) -> Self {
        Self {
            time,
            id,
            data,
            schedule: Schedule::Once,
        }
    }

    /// A periodic event first firing at `first`, then every `period`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for a zero `period` or for
    /// `Cycles::Count(0)`.
    pub fn periodic(
        first: Instant,
        id: EventId,
        data: T,
        period: Duration,
        cycles: Cycles,
    ) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::InvalidArgument("period must be positive"));
        }
        if cycles == Cycles::Count(0) {
            return Err(Error::InvalidArgument("periodic event needs at least one cycle"));
        }

        Ok(Self {
            time: first,
            id,
            data,
            schedule: Schedule::Periodic { period, cycles },
        })
    }

    /// Next time the event is due.
    pub fn time(&self) -> Instant {
        self.time
    }

    /// Classification tag.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Attached data.
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Attached data, mutably.
    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    /// Consumes the event, returning its data.
    pub fn into_data(self) -> T {
        self.data
    }

    /// Firing pattern, with the cycles left for a periodic event.
    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    /// Whether the event re-arms after firing.
    pub fn is_periodic(&self) -> bool {
        matches!(self.schedule, Schedule::Periodic { .. })
    }

    /// Accounts for one firing. Returns `true` when the event must be queued
    /// again, in which case its time has moved forward by one period.
    pub(crate) fn rearm(&mut self) -> bool {
        let Schedule::Periodic { period, cycles } = &mut self.schedule else {
            return false;
        };

        match cycles {
            Cycles::Infinite => {}
            Cycles::Count(n) if *n > 1 => *n -= 1,
            Cycles::Count(n) => {
                *n = 0;
                return false;
            }
        }

        match self.time.checked_add(*period) {
            Some(next) => {
                self.time = next;
                true
            }
            None => false,
        }
    }
}
