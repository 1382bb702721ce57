use crate::error::Result;
use crate::io::sys::{sys_pipe, sys_read};

use libc::c_int;
use signal_hook::SigId;
use std::collections::BTreeMap;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicI32, Ordering};

/// Write end of the pipe belonging to the running loop, or -1.
///
/// Only one self-pipe can be active at a time. A loop claims the slot when it
/// starts running and restores the previous holder when it stops, so nested
/// or sequential loops on the same thread hand it back and forth cleanly.
/// Two loops running concurrently on different threads would steal each
/// other's signals.
static ACTIVE_PIPE: AtomicI32 = AtomicI32::new(-1);

/// Runs inside the signal handler: only async-signal-safe calls.
fn forward_signal(signo: c_int) {
    let fd = ACTIVE_PIPE.load(Ordering::Relaxed);
    if fd < 0 {
        return;
    }

    let byte = signo as u8;
    unsafe {
        libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
    }
}

pub(crate) struct SelfPipe {
    read: OwnedFd,
    write: OwnedFd,
    /// Actions registered with `signal_hook`, removed by `uninstall`.
    actions: BTreeMap<c_int, SigId>,
    /// Slot value to restore on `leave`, while entered.
    entered: Option<RawFd>,
}

impl SelfPipe {
    pub(crate) fn open() -> Result<Self> {
        let (read, write) = sys_pipe()?;

        Ok(Self {
            read,
            write,
            actions: BTreeMap::new(),
            entered: None,
        })
    }

    pub(crate) fn fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    pub(crate) fn install(&mut self, signo: c_int) -> Result<()> {
        if self.actions.contains_key(&signo) {
            return Ok(());
        }

        // The action only touches an atomic and write(2).
        let id = unsafe { signal_hook::low_level::register(signo, move || forward_signal(signo))? };
        self.actions.insert(signo, id);

        Ok(())
    }

    /// Removes our action for `signo`. Returns whether one was registered.
    pub(crate) fn uninstall(&mut self, signo: c_int) -> bool {
        match self.actions.remove(&signo) {
            Some(id) => signal_hook::low_level::unregister(id),
            None => false,
        }
    }

    pub(crate) fn enter(&mut self) {
        if self.entered.is_none() {
            let previous = ACTIVE_PIPE.swap(self.write.as_raw_fd(), Ordering::SeqCst);
            self.entered = Some(previous);
        }
    }

    pub(crate) fn leave(&mut self) {
        if let Some(previous) = self.entered.take() {
            ACTIVE_PIPE.store(previous, Ordering::SeqCst);
        }
    }

    pub(crate) fn drain(&mut self, out: &mut Vec<c_int>) -> Result<()> {
        let mut bytes = [0u8; 64];

        loop {
            match sys_read(self.fd(), &mut bytes) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    out.extend(bytes[..n].iter().map(|b| c_int::from(*b)));
                    if n < bytes.len() {
                        return Ok(());
                    }
                }
                Err(err) => match err.kind() {
                    io::ErrorKind::Interrupted => continue,
                    io::ErrorKind::WouldBlock => return Ok(()),
                    _ => return Err(err.into()),
                },
            }
        }
    }
}

impl Drop for SelfPipe {
    fn drop(&mut self) {
        self.leave();

        let signals: Vec<c_int> = self.actions.keys().copied().collect();
        for signo in signals {
            if !self.uninstall(signo) {
                tracing::warn!(signo, "signal action was already gone");
            }
        }
    }
}
