//! Time-ordered collection of one-shot and periodic events.
//!
//! Events are kept sorted by due time, ties resolved by insertion order. A
//! periodic event that fires and still has cycles left is queued again one
//! period later; that re-insertion counts as a new insertion for tie-breaking.
//!
//! # Example
//!
//! ```
//! use eventcore::{Cycles, Due, EventId, Scheduler};
//! use std::time::{Duration, Instant};
//!
//! let mut scheduler = Scheduler::new();
//! let start = Instant::now();
//! scheduler
//!     .schedule_periodic(start, EventId(7), "tick", Duration::from_secs(1), Cycles::Count(2))
//!     .unwrap();
//!
//! let first = scheduler.pop_due_at(start).unwrap();
//! assert!(matches!(first, Due::Rearmed { .. }));
//!
//! let second = scheduler.pop_due_at(start + Duration::from_secs(1)).unwrap();
//! assert!(matches!(second, Due::Finished { .. }));
//! assert!(scheduler.is_empty());
//! ```

use crate::error::{Error, Result};
use crate::time::event::{Cycles, Event, EventId, EventKey, EventState};

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// Ordering key: due time, then insertion sequence.
type Slot = (Instant, u64);

/// Result of [`Scheduler::pop_due`].
#[derive(Debug)]
pub enum Due<T> {
    /// A periodic event fired and was queued again; `data` is a clone of the
    /// data that stays in the scheduler.
    Rearmed { key: EventKey, id: EventId, data: T },
    /// The event fired for the last time. The scheduler no longer knows it
    /// and ownership returns to the caller.
    Finished { key: EventKey, event: Event<T> },
}

impl<T> Due<T> {
    /// Key of the event that fired.
    pub fn key(&self) -> EventKey {
        match self {
            Due::Rearmed { key, .. } | Due::Finished { key, .. } => *key,
        }
    }

    /// Tag of the event that fired.
    pub fn id(&self) -> EventId {
        match self {
            Due::Rearmed { id, .. } => *id,
            Due::Finished { event, .. } => event.id(),
        }
    }

    /// Data of the event that fired.
    pub fn data(&self) -> &T {
        match self {
            Due::Rearmed { data, .. } => data,
            Due::Finished { event, .. } => event.data(),
        }
    }

    /// Consumes the result, returning the event data.
    pub fn into_data(self) -> T {
        match self {
            Due::Rearmed { data, .. } => data,
            Due::Finished { event, .. } => event.into_data(),
        }
    }
}

/// Time-ordered queue of [`Event`]s addressed by [`EventKey`].
pub struct Scheduler<T> {
    queue: BTreeMap<Slot, (EventKey, Event<T>)>,
    index: HashMap<EventKey, Slot>,
    next_seq: u64,
    next_key: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            queue: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
            next_key: 0,
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no event is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Takes ownership of a caller-built event and queues it.
    pub fn schedule(&mut self, event: Event<T>) -> EventKey {
        let key = EventKey(self.next_key);
        self.next_key += 1;
        self.insert(key, event);

        key
    }

    /// Queues a one-shot event due at `at`. A time in the past makes the
    /// event due immediately.
    pub fn schedule_once(&mut self, at: Instant, id: EventId, data: T) -> EventKey {
        self.schedule(Event::once(at, id, data))
    }

    /// Queues a one-shot event due `delay` from now.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the deadline is not representable.
    pub fn schedule_once_after(&mut self, delay: Duration, id: EventId, data: T) -> Result<EventKey> {
        let at = deadline_after(delay)?;

        Ok(self.schedule_once(at, id, data))
    }

    /// Queues a periodic event first due at `first`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for a zero `period` or
    /// `Cycles::Count(0)`.
    pub fn schedule_periodic(
        &mut self,
        first: Instant,
        id: EventId,
        data: T,
        period: Duration,
        cycles: Cycles,
    ) -> Result<EventKey> {
        let event = Event::periodic(first, id, data, period, cycles)?;

        Ok(self.schedule(event))
    }

    /// Queues a periodic event first due one `period` from now.
    ///
    /// # Errors
    /// Same as [`schedule_periodic`](Self::schedule_periodic).
    pub fn schedule_periodic_after(
        &mut self,
        id: EventId,
        data: T,
        period: Duration,
        cycles: Cycles,
    ) -> Result<EventKey> {
        let first = deadline_after(period)?;

        self.schedule_periodic(first, id, data, period, cycles)
    }

    /// Time left until the earliest event, clamped at zero. `None` when the
    /// scheduler is empty.
    pub fn next_wait_interval(&self) -> Option<Duration> {
        self.next_wait_interval_at(Instant::now())
    }

    /// Like [`next_wait_interval`](Self::next_wait_interval), measured from
    /// `now`.
    pub fn next_wait_interval_at(&self, now: Instant) -> Option<Duration> {
        self.queue
            .first_key_value()
            .map(|((time, _), _)| time.saturating_duration_since(now))
    }

    /// Whether `key` still addresses a queued event.
    pub fn state(&self, key: EventKey) -> EventState {
        if self.index.contains_key(&key) {
            EventState::Scheduled
        } else {
            EventState::Free
        }
    }

    /// Current due time of a scheduled event.
    pub fn deadline(&self, key: EventKey) -> Option<Instant> {
        self.index.get(&key).map(|(time, _)| *time)
    }

    /// Cancels one event and hands it back.
    pub fn delete(&mut self, key: EventKey) -> Option<Event<T>> {
        let slot = self.index.remove(&key)?;

        self.queue.remove(&slot).map(|(_, event)| event)
    }

    /// Cancels every event tagged with `id`.
    pub fn delete_id(&mut self, id: EventId) -> Vec<Event<T>> {
        self.delete_where(|event| event.id() == id)
    }

    /// Cancels every event matching `predicate`, in due order.
    pub fn delete_where(&mut self, mut predicate: impl FnMut(&Event<T>) -> bool) -> Vec<Event<T>> {
        let matching: Vec<Slot> = self
            .queue
            .iter()
            .filter(|(_, (_, event))| predicate(event))
            .map(|(slot, _)| *slot)
            .collect();

        matching
            .into_iter()
            .filter_map(|slot| self.queue.remove(&slot))
            .map(|(key, event)| {
                self.index.remove(&key);
                event
            })
            .collect()
    }

    /// Drops every queued event.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.index.clear();
    }

    fn insert(&mut self, key: EventKey, event: Event<T>) {
        let slot = (event.time(), self.next_seq);
        self.next_seq += 1;

        self.index.insert(key, slot);
        self.queue.insert(slot, (key, event));
    }
}

impl<T: Clone> Scheduler<T> {
    /// Removes the earliest event if it is due.
    ///
    /// Periodic events with cycles left are re-queued one period after their
    /// previous due time and reported as [`Due::Rearmed`]; anything else is
    /// reported as [`Due::Finished`].
    pub fn pop_due(&mut self) -> Option<Due<T>> {
        self.pop_due_at(Instant::now())
    }

    /// Like [`pop_due`](Self::pop_due), with `now` supplied by the caller.
    pub fn pop_due_at(&mut self, now: Instant) -> Option<Due<T>> {
        let entry = self.queue.first_entry()?;
        if entry.key().0 > now {
            return None;
        }

        let (key, mut event) = entry.remove();
        self.index.remove(&key);

        if event.rearm() {
            let id = event.id();
            let data = event.data().clone();
            self.insert(key, event);

            Some(Due::Rearmed { key, id, data })
        } else {
            Some(Due::Finished { key, event })
        }
    }
}

impl<T> fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("len", &self.queue.len())
            .field("next", &self.queue.first_key_value().map(|((time, _), _)| *time))
            .finish()
    }
}

fn deadline_after(delay: Duration) -> Result<Instant> {
    Instant::now()
        .checked_add(delay)
        .ok_or(Error::InvalidArgument("delay is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_times_pop_in_insertion_order() {
        let mut scheduler = Scheduler::new();
        let at = Instant::now();
        scheduler.schedule_once(at, EventId(1), 'a');
        scheduler.schedule_once(at, EventId(2), 'b');
        scheduler.schedule_once(at, EventId(3), 'c');

        let order: Vec<char> = std::iter::from_fn(|| scheduler.pop_due_at(at))
            .map(Due::into_data)
            .collect();
        assert_eq!(order, ['a', 'b', 'c']);
    }

    #[test]
    fn test_rearmed_event_keeps_its_key() {
        let mut scheduler = Scheduler::new();
        let at = Instant::now();
        let period = Duration::from_millis(10);
        let key = scheduler
            .schedule_periodic(at, EventId(1), (), period, Cycles::Infinite)
            .unwrap();

        let due = scheduler.pop_due_at(at).unwrap();
        assert_eq!(due.key(), key);
        assert_eq!(scheduler.state(key), EventState::Scheduled);
        assert_eq!(scheduler.deadline(key), Some(at + period));
    }
}
