//! Descriptor helpers the channel needs, on top of nix.

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::poll::{poll, PollFd, PollFlags};
use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD)?);
    fcntl(fd, FcntlArg::F_SETFD(flags | FdFlag::FD_CLOEXEC))?;
    Ok(())
}

pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

pub fn isatty(fd: RawFd) -> bool {
    nix::unistd::isatty(fd).unwrap_or(false)
}

/// Name of the terminal device open on `fd`.
pub fn ttyname(fd: RawFd) -> io::Result<PathBuf> {
    if !isatty(fd) {
        return Err(io::Error::new(io::ErrorKind::Other, "not a terminal"));
    }
    Ok(nix::unistd::ttyname(fd)?)
}

/// Wait until one of `fds` is readable (or hung up). Return readiness of each descriptor,
/// all false on timeout. A poll interrupted by a signal is restarted with the time left.
///
/// Every descriptor in `fds` must stay open for the duration of the call.
pub fn poll_readable(fds: &[RawFd], timeout: Option<Duration>) -> io::Result<Vec<bool>> {
    // SAFETY: the caller keeps the descriptors open while polling
    let borrowed = fds
        .iter()
        .map(|fd| unsafe { BorrowedFd::borrow_raw(*fd) })
        .collect::<Vec<_>>();
    let deadline = timeout.map(|t| Instant::now() + t);

    loop {
        let mut pollfds = borrowed
            .iter()
            .map(|fd| PollFd::new(fd, PollFlags::POLLIN))
            .collect::<Vec<_>>();
        let millis = deadline.map_or(-1, |d| {
            d.saturating_duration_since(Instant::now())
                .as_millis()
                .min(i32::MAX as u128) as i32
        });

        match poll(&mut pollfds, millis) {
            Ok(_) => {
                let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
                return Ok(pollfds
                    .iter()
                    .map(|p| p.revents().map_or(false, |r| r.intersects(ready)))
                    .collect());
            }
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}
