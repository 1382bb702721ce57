use std::cell::{Cell, RefCell};
use std::os::fd::RawFd;
use std::rc::Rc;
use std::time::{Duration, Instant};

use eventcore::{
    Continuation, Cycles, Error, EventId, EventLoop, EventLoopBuilder, Handler, Interest, Trigger,
    Watch,
};
use pretty_assertions::assert_eq;

fn pipe() -> (RawFd, RawFd) {
    let mut fds = [0i32; 2];
    let res = unsafe { libc::pipe(fds.as_mut_ptr()) };
    assert_eq!(res, 0, "pipe() failed");
    (fds[0], fds[1])
}

fn close(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn write_byte(fd: RawFd) {
    let buf = [1u8; 1];
    let wrote = unsafe { libc::write(fd, buf.as_ptr() as *const _, 1) };
    assert_eq!(wrote, 1);
}

#[test]
fn test_stop_on_first_readiness() {
    let (rfd, wfd) = pipe();
    let mut event_loop = EventLoop::new();

    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    event_loop
        .add_fd(
            rfd,
            Interest::READABLE,
            Handler::new(move |_, trigger| {
                seen.set(seen.get() + 1);
                match trigger {
                    Trigger::Descriptor { fd, readiness } => {
                        assert_eq!(fd, rfd);
                        assert!(readiness.is_readable());
                    }
                    other => panic!("unexpected trigger {other:?}"),
                }
                Continuation::Stop
            }),
        )
        .unwrap();

    write_byte(wfd);

    let start = Instant::now();
    event_loop.run().unwrap();

    assert_eq!(calls.get(), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!event_loop.is_running());

    close(rfd);
    close(wfd);
}

#[test]
fn test_nested_run_fails_without_touching_registrations() {
    let (rfd, wfd) = pipe();
    let mut event_loop = EventLoop::new();

    let nested = Rc::new(RefCell::new(None));
    let result = nested.clone();
    event_loop
        .add_fd(
            rfd,
            Interest::READABLE,
            Handler::new(move |event_loop, _| {
                *result.borrow_mut() = Some(event_loop.run());
                assert!(event_loop.is_running());
                Continuation::Stop
            }),
        )
        .unwrap();

    write_byte(wfd);
    event_loop.run().unwrap();

    assert!(matches!(
        nested.borrow_mut().take(),
        Some(Err(Error::AlreadyRunning))
    ));
    assert_eq!(event_loop.interest(rfd), Some(Interest::READABLE));

    close(rfd);
    close(wfd);
}

#[test]
fn test_one_shot_timer_stops_loop() {
    let mut event_loop = EventLoop::new();

    let fired = Rc::new(RefCell::new(Vec::new()));
    let log = fired.clone();
    let key = event_loop
        .schedule_once_after(
            Duration::from_millis(30),
            EventId(4),
            Handler::new(move |_, trigger| {
                log.borrow_mut().push(trigger);
                Continuation::Stop
            }),
        )
        .unwrap();

    let start = Instant::now();
    event_loop.run().unwrap();

    assert!(start.elapsed() >= Duration::from_millis(30));
    assert_eq!(
        *fired.borrow(),
        vec![Trigger::Timer {
            key,
            id: EventId(4)
        }]
    );
    assert_eq!(event_loop.next_timeout(), None);
}

#[test]
fn test_periodic_timer_fires_each_cycle() {
    let mut event_loop = EventLoop::new();

    let count = Rc::new(Cell::new(0));
    let ticks = count.clone();
    event_loop
        .schedule_periodic_after(
            EventId(1),
            Handler::new(move |_, _| {
                ticks.set(ticks.get() + 1);
                Continuation::Continue
            }),
            Duration::from_millis(5),
            Cycles::Count(3),
        )
        .unwrap();
    event_loop
        .schedule_once_after(
            Duration::from_millis(100),
            EventId(2),
            Handler::new(|_, _| Continuation::Stop),
        )
        .unwrap();

    event_loop.run().unwrap();

    assert_eq!(count.get(), 3);
}

#[test]
fn test_default_callback_and_timer_cancellation() {
    let triggers = Rc::new(RefCell::new(Vec::new()));
    let log = triggers.clone();
    let mut event_loop = EventLoopBuilder::new()
        .default_callback(move |_, trigger| {
            log.borrow_mut().push(trigger);
            Continuation::Stop
        })
        .build();

    let cancelled = event_loop
        .schedule_once_after(Duration::from_millis(5), EventId(7), Handler::Default)
        .unwrap();
    event_loop
        .schedule_once_after(Duration::from_millis(5), EventId(7), Handler::Default)
        .unwrap();
    let kept = event_loop
        .schedule_once_after(Duration::from_millis(20), EventId(8), Handler::Default)
        .unwrap();

    assert!(event_loop.cancel_timer(cancelled));
    assert!(!event_loop.cancel_timer(cancelled));
    assert_eq!(event_loop.cancel_timers(EventId(7)), 1);

    event_loop.run().unwrap();

    assert_eq!(
        *triggers.borrow(),
        vec![Trigger::Timer {
            key: kept,
            id: EventId(8)
        }]
    );
}

#[test]
fn test_callback_removes_itself_and_schedules_stop() {
    let (rfd, wfd) = pipe();
    let mut event_loop = EventLoop::new();

    let calls = Rc::new(Cell::new(0));
    let seen = calls.clone();
    event_loop
        .add_fd(
            rfd,
            Interest::READABLE,
            Handler::new(move |event_loop, trigger| {
                seen.set(seen.get() + 1);
                let Trigger::Descriptor { fd, .. } = trigger else {
                    return Continuation::Continue;
                };
                event_loop.del_fd(fd).unwrap();
                event_loop
                    .schedule_once_after(
                        Duration::from_millis(10),
                        EventId(0),
                        Handler::new(|_, _| Continuation::Stop),
                    )
                    .unwrap();
                Continuation::Continue
            }),
        )
        .unwrap();

    // Stays readable: without the removal the callback would run again.
    write_byte(wfd);
    event_loop.run().unwrap();

    assert_eq!(calls.get(), 1);
    assert_eq!(event_loop.interest(rfd), None);

    close(rfd);
    close(wfd);
}

#[test]
fn test_include_and_exclude_interest() {
    let (rfd, wfd) = pipe();
    let mut event_loop = EventLoop::new();

    event_loop
        .add_fd(wfd, Interest::empty(), Handler::new(|_, _| Continuation::Stop))
        .unwrap();
    event_loop.include_event(wfd, Interest::WRITABLE).unwrap();
    assert_eq!(event_loop.interest(wfd), Some(Interest::WRITABLE));

    event_loop.run().unwrap();

    event_loop.exclude_event(wfd, Interest::WRITABLE).unwrap();
    assert_eq!(event_loop.interest(wfd), Some(Interest::empty()));

    assert!(matches!(
        event_loop.include_event(rfd, Interest::READABLE),
        Err(Error::NotRegistered(Watch::Descriptor(fd))) if fd == rfd
    ));
    assert!(matches!(
        event_loop.del_fd(rfd),
        Err(Error::NotRegistered(_))
    ));
    assert!(matches!(
        event_loop.add_fd(-1, Interest::READABLE, Handler::Default),
        Err(Error::InvalidArgument(_))
    ));

    close(rfd);
    close(wfd);
}

#[test]
fn test_request_stop_finishes_batch() {
    let (rfd1, wfd1) = pipe();
    let (rfd2, wfd2) = pipe();
    let mut event_loop = EventLoop::new();

    let calls = Rc::new(Cell::new(0));
    for fd in [rfd1, rfd2] {
        let seen = calls.clone();
        event_loop
            .add_fd(
                fd,
                Interest::READABLE,
                Handler::new(move |event_loop, _| {
                    seen.set(seen.get() + 1);
                    event_loop.request_stop();
                    Continuation::Continue
                }),
            )
            .unwrap();
    }

    write_byte(wfd1);
    write_byte(wfd2);
    event_loop.run().unwrap();

    assert_eq!(calls.get(), 2);

    for fd in [rfd1, wfd1, rfd2, wfd2] {
        close(fd);
    }
}

#[test]
fn test_registering_descriptor_again_replaces_handler() {
    let (rfd, wfd) = pipe();
    let mut event_loop = EventLoop::new();

    let calls = Rc::new(RefCell::new(Vec::new()));
    let first = calls.clone();
    event_loop
        .add_fd(
            rfd,
            Interest::READABLE,
            Handler::new(move |_, _| {
                first.borrow_mut().push("first");
                Continuation::Stop
            }),
        )
        .unwrap();
    let second = calls.clone();
    event_loop
        .add_fd(
            rfd,
            Interest::READABLE | Interest::HANGUP,
            Handler::new(move |_, _| {
                second.borrow_mut().push("second");
                Continuation::Stop
            }),
        )
        .unwrap();
    assert_eq!(
        event_loop.interest(rfd),
        Some(Interest::READABLE | Interest::HANGUP)
    );

    write_byte(wfd);
    event_loop.run().unwrap();

    assert_eq!(*calls.borrow(), vec!["second"]);

    close(rfd);
    close(wfd);
}
