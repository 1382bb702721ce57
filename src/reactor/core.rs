use crate::error::{Error, Result, Watch};
use crate::reactor::event::{self, Interest};
use crate::reactor::signal::{SignalSource, SignalStrategy};
use crate::reactor::{Continuation, Handler, Trigger};
use crate::time::{Cycles, EventId, EventKey, Scheduler};

use libc::{c_int, pollfd};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Reentrancy guard of an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

struct DescriptorWatch {
    interest: Interest,
    handler: Handler,
}

/// Single-threaded reactor over descriptors, signals and timers.
///
/// Every iteration blocks once on `ppoll`/`poll` across the registered
/// descriptors and the signal descriptor, with a timeout derived from the
/// earliest scheduled timer. Timers are dispatched when the wait returns with
/// nothing ready; a descriptor that becomes ready at a timer's deadline is
/// therefore served first and the timer follows on the next quiet wait.
///
/// Callbacks get `&mut EventLoop`, so they may add or remove any watch,
/// including their own, and schedule or cancel timers.
///
/// # Example
/// ```no_run
/// use eventcore::{Continuation, EventLoop, Handler, Interest};
///
/// let mut event_loop = EventLoop::new();
/// event_loop
///     .add_fd(0, Interest::READABLE, Handler::new(|_, trigger| {
///         println!("stdin: {trigger:?}");
///         Continuation::Stop
///     }))
///     .unwrap();
///
/// event_loop.run().unwrap();
/// ```
pub struct EventLoop {
    descriptors: BTreeMap<RawFd, DescriptorWatch>,
    signals: BTreeMap<c_int, Handler>,
    scheduler: Scheduler<Handler>,
    default: Handler,
    state: LoopState,
    stop_requested: bool,
    strategy: SignalStrategy,
    signal_source: Option<SignalSource>,
    pollfds: Vec<pollfd>,
    ready: Vec<(RawFd, Interest)>,
    delivered: Vec<c_int>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    /// Creates an idle loop with no default callback and the platform's
    /// preferred signal strategy.
    pub fn new() -> Self {
        Self::with_config(Handler::Default, SignalStrategy::default(), 0)
    }

    pub(crate) fn with_config(default: Handler, strategy: SignalStrategy, capacity: usize) -> Self {
        Self {
            descriptors: BTreeMap::new(),
            signals: BTreeMap::new(),
            scheduler: Scheduler::new(),
            default,
            state: LoopState::Idle,
            stop_requested: false,
            strategy,
            signal_source: None,
            pollfds: Vec::with_capacity(capacity.saturating_add(1)),
            ready: Vec::with_capacity(capacity.saturating_add(1)),
            delivered: Vec::new(),
        }
    }

    /// Whether the loop is idle or running.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Whether [`run`](Self::run) is in progress.
    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Replaces the callback used by watches registered with
    /// [`Handler::Default`].
    pub fn set_default_callback(&mut self, handler: Handler) {
        self.default = handler;
    }

    /// Asks the running loop to stop once the current dispatch batch is done.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Runs until a callback asks to stop or the wait fails.
    ///
    /// # Errors
    /// - [`Error::AlreadyRunning`] when called from inside a callback of this
    ///   loop; registrations are left as they are.
    /// - [`Error::Io`] when waiting for readiness fails for any reason other
    ///   than an interrupted call.
    pub fn run(&mut self) -> Result<()> {
        if self.state == LoopState::Running {
            return Err(Error::AlreadyRunning);
        }

        self.state = LoopState::Running;
        self.stop_requested = false;
        if let Some(source) = self.signal_source.as_mut() {
            source.enter();
        }
        tracing::debug!(
            descriptors = self.descriptors.len(),
            signals = self.signals.len(),
            timers = self.scheduler.len(),
            "event loop started"
        );

        let result = self.iterate();

        if let Some(source) = self.signal_source.as_mut() {
            source.leave();
        }
        self.state = LoopState::Idle;

        match &result {
            Ok(()) => tracing::debug!("event loop stopped"),
            Err(err) => tracing::warn!(error = %err, "event loop stopped on error"),
        }

        result
    }

    fn iterate(&mut self) -> Result<()> {
        while !self.stop_requested {
            let timeout = self.scheduler.next_wait_interval();
            self.prepare_pollfds();
            let mask = match self.signal_source.as_ref() {
                Some(source) => source.wait_mask()?,
                None => None,
            };

            let ready = match event::wait(&mut self.pollfds, timeout, mask.as_ref().map(|m| m.as_raw())) {
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };

            if ready == 0 {
                self.dispatch_timers();
            } else {
                self.dispatch_ready()?;
            }
        }

        Ok(())
    }

    fn prepare_pollfds(&mut self) {
        self.pollfds.clear();

        if let Some(source) = self.signal_source.as_ref() {
            self.pollfds.push(pollfd {
                fd: source.fd(),
                events: Interest::READABLE.bits(),
                revents: 0,
            });
        }

        self.pollfds
            .extend(self.descriptors.iter().map(|(fd, watch)| pollfd {
                fd: *fd,
                events: watch.interest.bits(),
                revents: 0,
            }));
    }

    fn dispatch_timers(&mut self) {
        let now = Instant::now();

        while let Some(due) = self.scheduler.pop_due_at(now) {
            let trigger = Trigger::Timer {
                key: due.key(),
                id: due.id(),
            };
            let handler = due.into_data();

            tracing::trace!(?trigger, "timer due");
            if self.dispatch(&handler, trigger) == Continuation::Stop {
                self.stop_requested = true;
            }
        }
    }

    fn dispatch_ready(&mut self) -> Result<()> {
        let signal_fd = self.signal_source.as_ref().map(SignalSource::fd);

        let mut ready = mem::take(&mut self.ready);
        ready.clear();
        ready.extend(
            self.pollfds
                .iter()
                .filter(|p| p.revents != 0)
                .map(|p| (p.fd, Interest::from_bits_truncate(p.revents))),
        );

        let mut result = Ok(());
        for &(fd, readiness) in &ready {
            if Some(fd) == signal_fd {
                if let Err(err) = self.dispatch_signals() {
                    result = Err(err);
                }
                continue;
            }

            // An earlier callback of this batch may have removed the watch.
            let Some(watch) = self.descriptors.get(&fd) else {
                continue;
            };
            let handler = watch.handler.clone();

            tracing::trace!(fd, ?readiness, "descriptor ready");
            if self.dispatch(&handler, Trigger::Descriptor { fd, readiness }) == Continuation::Stop {
                self.stop_requested = true;
            }
        }

        self.ready = ready;

        result
    }

    fn dispatch_signals(&mut self) -> Result<()> {
        let Some(source) = self.signal_source.as_mut() else {
            return Ok(());
        };

        let mut delivered = mem::take(&mut self.delivered);
        delivered.clear();
        let drained = source.drain(&mut delivered);

        for &signo in &delivered {
            let Some(handler) = self.signals.get(&signo).cloned() else {
                continue;
            };

            tracing::trace!(signo, "signal delivered");
            if self.dispatch(&handler, Trigger::Signal(signo)) == Continuation::Stop {
                self.stop_requested = true;
            }
        }

        self.delivered = delivered;

        drained
    }

    fn dispatch(&mut self, handler: &Handler, trigger: Trigger) -> Continuation {
        let callback = match handler {
            Handler::Callback(callback) => callback.clone(),
            Handler::Default => match &self.default {
                Handler::Callback(callback) => callback.clone(),
                Handler::Default => {
                    tracing::trace!(?trigger, "no callback, event ignored");
                    return Continuation::Continue;
                }
            },
        };

        let Ok(mut callback) = callback.try_borrow_mut() else {
            tracing::warn!(?trigger, "callback is already executing, event ignored");
            return Continuation::Continue;
        };

        (&mut *callback)(self, trigger)
    }

    /// Watches `fd` for the readiness bits in `interest`. Registering a
    /// descriptor again replaces its interest and handler.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for a negative descriptor.
    pub fn add_fd(&mut self, fd: RawFd, interest: Interest, handler: Handler) -> Result<()> {
        if fd < 0 {
            return Err(Error::InvalidArgument("descriptor must not be negative"));
        }

        let replaced = self
            .descriptors
            .insert(fd, DescriptorWatch { interest, handler })
            .is_some();
        tracing::debug!(fd, ?interest, replaced, "descriptor registered");

        Ok(())
    }

    /// Stops watching `fd`. The descriptor itself is left open.
    ///
    /// # Errors
    /// Returns [`Error::NotRegistered`] when `fd` is not watched.
    pub fn del_fd(&mut self, fd: RawFd) -> Result<()> {
        self.descriptors
            .remove(&fd)
            .ok_or(Error::NotRegistered(Watch::Descriptor(fd)))?;
        tracing::debug!(fd, "descriptor unregistered");

        Ok(())
    }

    /// Adds readiness bits to an existing watch.
    ///
    /// # Errors
    /// Returns [`Error::NotRegistered`] when `fd` is not watched.
    pub fn include_event(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        let watch = self
            .descriptors
            .get_mut(&fd)
            .ok_or(Error::NotRegistered(Watch::Descriptor(fd)))?;
        watch.interest |= interest;

        Ok(())
    }

    /// Removes readiness bits from an existing watch.
    ///
    /// # Errors
    /// Returns [`Error::NotRegistered`] when `fd` is not watched.
    pub fn exclude_event(&mut self, fd: RawFd, interest: Interest) -> Result<()> {
        let watch = self
            .descriptors
            .get_mut(&fd)
            .ok_or(Error::NotRegistered(Watch::Descriptor(fd)))?;
        watch.interest.remove(interest);

        Ok(())
    }

    /// Current interest of a watched descriptor.
    pub fn interest(&self, fd: RawFd) -> Option<Interest> {
        self.descriptors.get(&fd).map(|watch| watch.interest)
    }

    /// Routes `signo` to `handler`. The signal is blocked from now on except
    /// while the loop waits, and the change is applied to the OS right away.
    ///
    /// # Errors
    /// - [`Error::InvalidArgument`] for an unknown signal, `SIGKILL` or
    ///   `SIGSTOP`.
    /// - [`Error::Io`] when the signal source cannot be set up.
    pub fn add_signal(&mut self, signo: c_int, handler: Handler) -> Result<()> {
        if self.signal_source.is_none() {
            let mut source = SignalSource::open(self.strategy)?;
            if self.state == LoopState::Running {
                source.enter();
            }
            self.signal_source = Some(source);
        }
        if let Some(source) = self.signal_source.as_mut() {
            source.watch(signo)?;
        }
        let replaced = self.signals.insert(signo, handler).is_some();
        tracing::debug!(signo, replaced, "signal registered");

        Ok(())
    }

    /// Stops routing `signo` and restores its previous mask state.
    ///
    /// # Errors
    /// Returns [`Error::NotRegistered`] when `signo` is not watched.
    pub fn del_signal(&mut self, signo: c_int) -> Result<()> {
        if self.signals.remove(&signo).is_none() {
            return Err(Error::NotRegistered(Watch::Signal(signo)));
        }
        if let Some(source) = self.signal_source.as_mut() {
            source.unwatch(signo)?;
        }
        tracing::debug!(signo, "signal unregistered");

        Ok(())
    }

    /// Fires `handler` once at `at`.
    pub fn schedule_once(&mut self, at: Instant, id: EventId, handler: Handler) -> EventKey {
        self.scheduler.schedule_once(at, id, handler)
    }

    /// Fires `handler` once, `delay` from now.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if the deadline is not representable.
    pub fn schedule_once_after(&mut self, delay: Duration, id: EventId, handler: Handler) -> Result<EventKey> {
        self.scheduler.schedule_once_after(delay, id, handler)
    }

    /// Fires `handler` at `first`, then every `period`, `cycles` times.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for a zero period or zero cycles.
    pub fn schedule_periodic(
        &mut self,
        first: Instant,
        id: EventId,
        handler: Handler,
        period: Duration,
        cycles: Cycles,
    ) -> Result<EventKey> {
        self.scheduler
            .schedule_periodic(first, id, handler, period, cycles)
    }

    /// Fires `handler` every `period` starting one period from now.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] for a zero period or zero cycles.
    pub fn schedule_periodic_after(
        &mut self,
        id: EventId,
        handler: Handler,
        period: Duration,
        cycles: Cycles,
    ) -> Result<EventKey> {
        self.scheduler
            .schedule_periodic_after(id, handler, period, cycles)
    }

    /// Cancels one timer. Returns whether it was still scheduled.
    pub fn cancel_timer(&mut self, key: EventKey) -> bool {
        self.scheduler.delete(key).is_some()
    }

    /// Cancels every timer tagged with `id` and returns how many there were.
    pub fn cancel_timers(&mut self, id: EventId) -> usize {
        self.scheduler.delete_id(id).len()
    }

    /// Timeout the next wait would use; `None` means no timer is pending.
    pub fn next_timeout(&self) -> Option<Duration> {
        self.scheduler.next_wait_interval()
    }

    /// Read-only view of the scheduled timers.
    pub fn timers(&self) -> &Scheduler<Handler> {
        &self.scheduler
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("state", &self.state)
            .field("descriptors", &self.descriptors.keys().collect::<Vec<_>>())
            .field("signals", &self.signals.keys().collect::<Vec<_>>())
            .field("timers", &self.scheduler.len())
            .field("signal_source", &self.signal_source)
            .finish()
    }
}
