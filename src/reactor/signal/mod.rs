//! Signal delivery as a readable descriptor.
//!
//! The event loop does not care how signals reach it: a [`SignalSource`]
//! exposes one descriptor that becomes readable when a watched signal
//! arrives and yields the signal numbers when drained.
//!
//! Two backends exist:
//!
//! - [`SignalStrategy::SignalFd`] (Linux): watched signals stay blocked at all
//!   times and the kernel queues them on a `signalfd`.
//! - [`SignalStrategy::SelfPipe`]: watched signals are blocked except during
//!   the readiness wait, where an action registered through `signal_hook`
//!   writes the signal number into a pipe. The write end lives in one process-wide slot that the running
//!   loop claims on entry and hands back on exit.
//!
//! Either way, a watched signal is blocked whenever the loop is not waiting,
//! so a delivery landing just before the wait is never lost.

#[cfg(any(target_os = "linux", target_os = "android"))]
mod signalfd;

mod pipe;

use crate::error::{Error, Result, Watch};

use libc::{SIG_BLOCK, SIG_UNBLOCK, SIGKILL, SIGSTOP, c_int, sigset_t};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::os::fd::RawFd;

/// How signals are turned into descriptor readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStrategy {
    /// Kernel `signalfd`.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    SignalFd,
    /// Signal handler writing into a non-blocking pipe.
    SelfPipe,
}

impl Default for SignalStrategy {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn default() -> Self {
        SignalStrategy::SignalFd
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn default() -> Self {
        SignalStrategy::SelfPipe
    }
}

/// Owned `sigset_t`.
#[derive(Clone, Copy)]
pub(crate) struct SignalSet(sigset_t);

impl SignalSet {
    pub(crate) fn empty() -> Self {
        let mut set: sigset_t = unsafe { std::mem::zeroed() };
        unsafe { libc::sigemptyset(&mut set) };

        Self(set)
    }

    /// The calling thread's current signal mask.
    pub(crate) fn current() -> Result<Self> {
        let mut set = Self::empty();
        let rc = unsafe { libc::pthread_sigmask(SIG_BLOCK, std::ptr::null(), &mut set.0) };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc).into());
        }

        Ok(set)
    }

    pub(crate) fn single(signo: c_int) -> Result<Self> {
        let mut set = Self::empty();
        set.add(signo)?;

        Ok(set)
    }

    pub(crate) fn add(&mut self, signo: c_int) -> Result<()> {
        if unsafe { libc::sigaddset(&mut self.0, signo) } < 0 {
            return Err(Error::InvalidArgument("invalid signal number"));
        }

        Ok(())
    }

    pub(crate) fn remove(&mut self, signo: c_int) {
        unsafe { libc::sigdelset(&mut self.0, signo) };
    }

    pub(crate) fn contains(&self, signo: c_int) -> bool {
        unsafe { libc::sigismember(&self.0, signo) == 1 }
    }

    pub(crate) fn as_raw(&self) -> &sigset_t {
        &self.0
    }
}

/// Adds `signo` to the thread's blocked set. Returns whether it was already
/// blocked.
fn block(signo: c_int) -> Result<bool> {
    let set = SignalSet::single(signo)?;
    let mut previous = SignalSet::empty();

    let rc = unsafe { libc::pthread_sigmask(SIG_BLOCK, set.as_raw(), &mut previous.0) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc).into());
    }

    Ok(previous.contains(signo))
}

fn unblock(signo: c_int) -> Result<()> {
    let set = SignalSet::single(signo)?;

    let rc = unsafe { libc::pthread_sigmask(SIG_UNBLOCK, set.as_raw(), std::ptr::null_mut()) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc).into());
    }

    Ok(())
}

/// Mask holding every watched signal.
#[cfg(any(target_os = "linux", target_os = "android"))]
fn mask_of(watched: &BTreeMap<c_int, bool>) -> Result<SignalSet> {
    let mut set = SignalSet::empty();
    for signo in watched.keys() {
        set.add(*signo)?;
    }

    Ok(set)
}

enum Backend {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    SignalFd(signalfd::SignalFd),
    SelfPipe(pipe::SelfPipe),
}

/// A descriptor carrying the watched signals.
pub(crate) struct SignalSource {
    backend: Backend,
    /// Watched signal → whether it was blocked before we blocked it.
    watched: BTreeMap<c_int, bool>,
}

impl SignalSource {
    pub(crate) fn open(strategy: SignalStrategy) -> Result<Self> {
        let backend = match strategy {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            SignalStrategy::SignalFd => Backend::SignalFd(signalfd::SignalFd::open()?),
            SignalStrategy::SelfPipe => Backend::SelfPipe(pipe::SelfPipe::open()?),
        };
        tracing::debug!(?strategy, "signal source opened");

        Ok(Self {
            backend,
            watched: BTreeMap::new(),
        })
    }

    pub(crate) fn fd(&self) -> RawFd {
        match &self.backend {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Backend::SignalFd(signalfd) => signalfd.fd(),
            Backend::SelfPipe(pipe) => pipe.fd(),
        }
    }

    /// Starts routing `signo` to this source. Watching a signal twice
    /// re-applies its OS state.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] for an unknown signal, `SIGKILL` or
    /// `SIGSTOP`; [`Error::Io`] when the OS refuses the change.
    pub(crate) fn watch(&mut self, signo: c_int) -> Result<()> {
        if signo == SIGKILL || signo == SIGSTOP {
            return Err(Error::InvalidArgument("SIGKILL and SIGSTOP cannot be caught"));
        }
        SignalSet::single(signo)?;

        let newly_watched = !self.watched.contains_key(&signo);
        if newly_watched {
            let was_blocked = block(signo)?;
            self.watched.insert(signo, was_blocked);
        }

        let applied = match &mut self.backend {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Backend::SignalFd(signalfd) => {
                mask_of(&self.watched).and_then(|set| signalfd.set_mask(&set))
            }
            Backend::SelfPipe(pipe) => pipe.install(signo),
        };

        if let Err(err) = applied {
            if newly_watched
                && self.watched.remove(&signo) == Some(false)
                && let Err(unblock_err) = unblock(signo)
            {
                tracing::warn!(signo, error = %unblock_err, "failed to unblock signal after a failed watch");
            }
            return Err(err);
        }

        Ok(())
    }

    /// Stops routing `signo` and restores its previous mask state.
    ///
    /// # Errors
    /// [`Error::NotRegistered`] when `signo` is not watched.
    pub(crate) fn unwatch(&mut self, signo: c_int) -> Result<()> {
        let Some(was_blocked) = self.watched.remove(&signo) else {
            return Err(Error::NotRegistered(Watch::Signal(signo)));
        };

        match &mut self.backend {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Backend::SignalFd(signalfd) => {
                signalfd.set_mask(&mask_of(&self.watched)?)?;
                if !was_blocked {
                    signalfd::discard_pending(signo)?;
                    unblock(signo)?;
                }
            }
            Backend::SelfPipe(pipe) => {
                // Pending instances still reach our action before it is
                // removed.
                if !was_blocked {
                    unblock(signo)?;
                }
                if !pipe.uninstall(signo) {
                    tracing::warn!(signo, "no signal action to remove");
                }
            }
        }

        Ok(())
    }

    /// The mask to install for the duration of the readiness wait, if any.
    pub(crate) fn wait_mask(&self) -> Result<Option<SignalSet>> {
        match &self.backend {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Backend::SignalFd(_) => Ok(None),
            Backend::SelfPipe(_) => {
                let mut mask = SignalSet::current()?;
                for signo in self.watched.keys() {
                    mask.remove(*signo);
                }

                Ok(Some(mask))
            }
        }
    }

    /// Appends every signal number delivered since the last drain.
    pub(crate) fn drain(&mut self, out: &mut Vec<c_int>) -> Result<()> {
        match &mut self.backend {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Backend::SignalFd(signalfd) => signalfd.drain(out),
            Backend::SelfPipe(pipe) => pipe.drain(out),
        }
    }

    /// Called when the owning loop starts running.
    pub(crate) fn enter(&mut self) {
        if let Backend::SelfPipe(pipe) = &mut self.backend {
            pipe.enter();
        }
    }

    /// Called when the owning loop stops running.
    pub(crate) fn leave(&mut self) {
        if let Backend::SelfPipe(pipe) = &mut self.backend {
            pipe.leave();
        }
    }
}

impl Drop for SignalSource {
    fn drop(&mut self) {
        let signals: Vec<c_int> = self.watched.keys().copied().collect();
        for signo in signals {
            if let Err(err) = self.unwatch(signo) {
                tracing::warn!(signo, error = %err, "failed to restore signal state");
            }
        }
    }
}

impl fmt::Debug for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategy = match &self.backend {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Backend::SignalFd(_) => SignalStrategy::SignalFd,
            Backend::SelfPipe(_) => SignalStrategy::SelfPipe,
        };

        f.debug_struct("SignalSource")
            .field("strategy", &strategy)
            .field("fd", &self.fd())
            .field("watched", &self.watched.keys().collect::<Vec<_>>())
            .finish()
    }
}
