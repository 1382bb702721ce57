//! Thin wrappers over the raw descriptor syscalls used by the crate.
//!
//! Every wrapper converts the `-1`/`errno` convention into an [`io::Result`].

use libc::{F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, O_NONBLOCK, c_int, fcntl};
use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

/// Upper bound on the number of spans handed to a single `readv`/`writev`.
pub(crate) const MAX_IOV: usize = 64;

/// Scatter-read into `bufs`. `IoSliceMut` is ABI compatible with `iovec`.
pub(crate) fn sys_readv(fd: RawFd, bufs: &mut [IoSliceMut<'_>]) -> io::Result<usize> {
    let count = bufs.len().min(MAX_IOV) as c_int;
    let n = unsafe { libc::readv(fd, bufs.as_mut_ptr() as *const libc::iovec, count) };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(n as usize)
}

/// Gather-write from `bufs`. `IoSlice` is ABI compatible with `iovec`.
pub(crate) fn sys_writev(fd: RawFd, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
    let count = bufs.len().min(MAX_IOV) as c_int;
    let n = unsafe { libc::writev(fd, bufs.as_ptr() as *const libc::iovec, count) };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(n as usize)
}

pub(crate) fn sys_read(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(fd, buffer.as_mut_ptr() as *mut _, buffer.len()) };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(n as usize)
}

/// Sets `O_NONBLOCK` on `fd`, leaving the other status flags alone.
pub(crate) fn sys_set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & O_NONBLOCK != 0 {
        return Ok(());
    }

    let rc = unsafe { fcntl(fd, F_SETFL, flags | O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

fn sys_set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { fcntl(fd, F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    let rc = unsafe { fcntl(fd, F_SETFD, flags | FD_CLOEXEC) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Creates a non-blocking, close-on-exec pipe. Returns `(read, write)`.
pub(crate) fn sys_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    for fd in [fds[0], fds[1]] {
        sys_set_nonblocking(fd)?;
        sys_set_cloexec(fd)?;
    }

    Ok((read, write))
}
