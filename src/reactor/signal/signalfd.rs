use super::SignalSet;
use crate::error::Result;

use libc::{SFD_CLOEXEC, SFD_NONBLOCK, c_int, signalfd_siginfo};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

pub(crate) struct SignalFd {
    fd: OwnedFd,
}

impl SignalFd {
    pub(crate) fn open() -> Result<Self> {
        let mask = SignalSet::empty();
        let fd = unsafe { libc::signalfd(-1, mask.as_raw(), SFD_NONBLOCK | SFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Replaces the set of signals queued on this descriptor.
    pub(crate) fn set_mask(&mut self, mask: &SignalSet) -> Result<()> {
        let rc = unsafe { libc::signalfd(self.fd(), mask.as_raw(), SFD_NONBLOCK | SFD_CLOEXEC) };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(())
    }

    pub(crate) fn drain(&mut self, out: &mut Vec<c_int>) -> Result<()> {
        let mut infos: [signalfd_siginfo; 8] = unsafe { mem::zeroed() };

        loop {
            let n = unsafe {
                libc::read(
                    self.fd(),
                    infos.as_mut_ptr() as *mut libc::c_void,
                    mem::size_of_val(&infos),
                )
            };

            if n < 0 {
                let err = io::Error::last_os_error();
                match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => return Ok(()),
                    _ => return Err(err.into()),
                }
            }

            let count = n as usize / mem::size_of::<signalfd_siginfo>();
            out.extend(infos[..count].iter().map(|info| info.ssi_signo as c_int));

            if count < infos.len() {
                return Ok(());
            }
        }
    }
}

/// Consumes any pending instance of `signo` so that unblocking it does not
/// trigger the default disposition.
pub(crate) fn discard_pending(signo: c_int) -> Result<()> {
    let set = SignalSet::single(signo)?;
    let zero = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    loop {
        let rc = unsafe { libc::sigtimedwait(set.as_raw(), std::ptr::null_mut(), &zero) };
        if rc == signo {
            tracing::trace!(signo, "discarded pending signal");
            continue;
        }

        let err = io::Error::last_os_error();
        return match err.kind() {
            io::ErrorKind::Interrupted => continue,
            _ => Ok(()),
        };
    }
}
