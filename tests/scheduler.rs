use eventcore::{Cycles, Due, Error, Event, EventId, EventState, Scheduler};
use pretty_assertions::assert_eq;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_one_shot_fires_once_after_delay() {
    let mut scheduler = Scheduler::new();
    scheduler
        .schedule_once_after(Duration::from_millis(500), EventId(3), "once")
        .unwrap();

    assert!(scheduler.pop_due().is_none());
    let wait = scheduler.next_wait_interval().unwrap();
    assert!(wait > Duration::ZERO);
    assert!(wait < Duration::from_millis(500));

    thread::sleep(Duration::from_millis(500));

    let due = scheduler.pop_due().unwrap();
    assert_eq!(due.id(), EventId(3));
    assert!(matches!(due, Due::Finished { .. }));
    assert_eq!(due.into_data(), "once");
    assert!(scheduler.pop_due().is_none());
    assert_eq!(scheduler.next_wait_interval(), None);
}

#[test]
fn test_periodic_count_fires_exactly_twice() {
    let mut scheduler = Scheduler::new();
    let start = Instant::now();
    let period = Duration::from_millis(100);
    let key = scheduler
        .schedule_periodic(start + period, EventId(1), 42u32, period, Cycles::Count(2))
        .unwrap();

    assert!(scheduler.pop_due_at(start).is_none());

    let first = scheduler.pop_due_at(start + period).unwrap();
    assert!(matches!(first, Due::Rearmed { data: 42, .. }));
    assert_eq!(scheduler.deadline(key), Some(start + period * 2));

    let second = scheduler.pop_due_at(start + period * 2).unwrap();
    assert!(matches!(second, Due::Finished { .. }));
    assert_eq!(scheduler.state(key), EventState::Free);

    assert!(scheduler.pop_due_at(start + period * 10).is_none());
}

#[test]
fn test_periodic_after_first_fires_one_period_out() {
    let mut scheduler = Scheduler::new();
    let before = Instant::now();
    let period = Duration::from_millis(50);
    let key = scheduler
        .schedule_periodic_after(EventId(1), (), period, Cycles::Count(2))
        .unwrap();

    let deadline = scheduler.deadline(key).unwrap();
    assert!(deadline >= before + period);
}

#[test]
fn test_infinite_periodic_runs_until_deleted() {
    let mut scheduler = Scheduler::new();
    let start = Instant::now();
    let period = Duration::from_millis(10);
    let key = scheduler
        .schedule_periodic(start, EventId(9), (), period, Cycles::Infinite)
        .unwrap();

    for n in 0..50u32 {
        let due = scheduler.pop_due_at(start + period * n).unwrap();
        assert!(matches!(due, Due::Rearmed { .. }));
    }

    let removed = scheduler.delete(key).unwrap();
    assert_eq!(removed.id(), EventId(9));
    assert!(scheduler.is_empty());
    assert!(scheduler.pop_due_at(start + period * 100).is_none());
}

#[test]
fn test_delete_by_id_removes_every_match() {
    let mut scheduler = Scheduler::new();
    let at = Instant::now() + Duration::from_secs(60);
    scheduler.schedule_once(at, EventId(1), 'a');
    let kept = scheduler.schedule_once(at, EventId(2), 'b');
    scheduler.schedule_once(at, EventId(1), 'c');

    let removed: Vec<char> = scheduler
        .delete_id(EventId(1))
        .into_iter()
        .map(Event::into_data)
        .collect();
    assert_eq!(removed, vec!['a', 'c']);
    assert_eq!(scheduler.len(), 1);
    assert_eq!(scheduler.state(kept), EventState::Scheduled);

    assert!(scheduler.delete_id(EventId(1)).is_empty());
}

#[test]
fn test_invalid_periodic_is_rejected() {
    let mut scheduler: Scheduler<()> = Scheduler::new();
    let now = Instant::now();

    assert!(matches!(
        scheduler.schedule_periodic(now, EventId(1), (), Duration::ZERO, Cycles::Infinite),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        scheduler.schedule_periodic(now, EventId(1), (), Duration::from_secs(1), Cycles::Count(0)),
        Err(Error::InvalidArgument(_))
    ));
    assert!(scheduler.is_empty());
}

#[test]
fn test_caller_built_event_is_owned_by_scheduler() {
    let mut scheduler = Scheduler::new();
    let now = Instant::now();
    let event = Event::once(now, EventId(5), String::from("payload"));

    let key = scheduler.schedule(event);
    assert_eq!(scheduler.state(key), EventState::Scheduled);

    let due = scheduler.pop_due_at(now).unwrap();
    assert_eq!(due.key(), key);
    assert_eq!(due.data(), "payload");
    assert_eq!(scheduler.state(key), EventState::Free);
}
