//! Readiness masks and the blocking wait on a set of descriptors.

use libc::{POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT, c_short, pollfd, sigset_t};
use std::io;
use std::time::Duration;

bitflags::bitflags! {
    /// Readiness bits, used both as the interest of a descriptor watch and
    /// as the readiness reported to its callback.
    pub struct Interest: c_short {
        const READABLE = POLLIN;
        const WRITABLE = POLLOUT;
        const ERROR = POLLERR;
        const HANGUP = POLLHUP;
        /// The descriptor is not open. Only ever reported, never requested.
        const INVALID = POLLNVAL;
    }
}

impl Interest {
    /// Input is available, or the peer hung up with input pending.
    pub const fn is_readable(self) -> bool {
        self.intersects(Interest::READABLE)
    }

    /// A write would not block.
    pub const fn is_writable(self) -> bool {
        self.intersects(Interest::WRITABLE)
    }
}

/// Blocks until a descriptor in `fds` is ready, a signal interrupts the wait
/// or `timeout` elapses (`None` waits forever). Returns the number of ready
/// descriptors; zero means the timeout expired.
///
/// When `sigmask` is given, it replaces the thread's signal mask for the
/// duration of the wait only. `ppoll` swaps the mask atomically.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub(crate) fn wait(
    fds: &mut [pollfd],
    timeout: Option<Duration>,
    sigmask: Option<&sigset_t>,
) -> io::Result<usize> {
    let timespec = timeout.map(|t| libc::timespec {
        tv_sec: t.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_nsec: t.subsec_nanos() as _,
    });
    let timespec_ptr = timespec
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);
    let sigmask_ptr = sigmask.map_or(std::ptr::null(), |m| m as *const sigset_t);

    let n = unsafe {
        libc::ppoll(
            fds.as_mut_ptr(),
            fds.len() as libc::nfds_t,
            timespec_ptr,
            sigmask_ptr,
        )
    };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(n as usize)
}

/// Blocks until a descriptor in `fds` is ready, a signal interrupts the wait
/// or `timeout` elapses (`None` waits forever). Returns the number of ready
/// descriptors; zero means the timeout expired.
///
/// Without `ppoll` the mask swap around `poll` is not atomic. That is only
/// sound together with the self-pipe signal source: a signal caught between
/// the swap and `poll` leaves a byte in the pipe, so `poll` returns at once.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(crate) fn wait(
    fds: &mut [pollfd],
    timeout: Option<Duration>,
    sigmask: Option<&sigset_t>,
) -> io::Result<usize> {
    let timeout_ms = timeout.map_or(-1, |t| {
        t.as_nanos().div_ceil(1_000_000).min(libc::c_int::MAX as u128) as libc::c_int
    });

    let mut previous: sigset_t = unsafe { std::mem::zeroed() };
    if let Some(mask) = sigmask {
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, mask, &mut previous) };
        if rc != 0 {
            let err = io::Error::from_raw_os_error(rc);
            tracing::warn!(error = %err, "failed to install the wait signal mask");
            return Err(err);
        }
    }

    let n = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
    let result = if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    };

    if sigmask.is_some() {
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, &previous, std::ptr::null_mut()) };
        if rc != 0 {
            let err = io::Error::from_raw_os_error(rc);
            tracing::warn!(error = %err, "failed to restore the signal mask after the wait");
        }
    }

    result
}
