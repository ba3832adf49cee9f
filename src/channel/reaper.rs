//! Child termination notification and reaping.

use crate::channel::sys;
use crate::error::Error;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use os_pipe::PipeReader;
use signal_hook::consts::SIGCHLD;
use signal_hook::SigId;
use std::fmt::{Display, Formatter};
use std::io::{self, Read};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

/// Set while a [`ChildWatch`] exists, SIGCHLD has a single consumer per process.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// SIGCHLD turned into readiness of a pipe descriptor (self-pipe), so the event loop can wait for
/// child termination together with the other descriptors.
pub struct ChildWatch {
    reader: PipeReader,
    sig_id: SigId,
}

impl ChildWatch {
    pub fn install() -> Result<Self, Error> {
        if ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::ChannelOverlap);
        }

        let install = || -> io::Result<(PipeReader, SigId)> {
            let (reader, writer) = os_pipe::pipe()?;
            sys::set_nonblocking(reader.as_raw_fd())?;
            sys::set_nonblocking(writer.as_raw_fd())?;
            sys::set_cloexec(reader.as_raw_fd())?;
            sys::set_cloexec(writer.as_raw_fd())?;
            let sig_id = signal_hook::low_level::pipe::register(SIGCHLD, writer)?;
            Ok((reader, sig_id))
        };

        match install() {
            Ok((reader, sig_id)) => Ok(Self { reader, sig_id }),
            Err(e) => {
                ACTIVE.store(false, Ordering::Release);
                Err(Error::IO(e))
            }
        }
    }

    pub fn fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Consume all pending notifications.
    pub fn drain(&mut self) {
        let mut buf = [0; 64];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => return,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => return,
            }
        }
    }
}

impl Drop for ChildWatch {
    fn drop(&mut self) {
        // restores the handlers installed before ours
        signal_hook::low_level::unregister(self.sig_id);
        ACTIVE.store(false, Ordering::Release);
    }
}

/// How the subordinate process ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    CoreDump(Signal),
    Signaled(Signal),
    Exited(i32),
    Other(String),
}

impl Display for Termination {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::CoreDump(sig) => write!(f, "process dumped core on signal {sig}"),
            Termination::Signaled(sig) => write!(f, "process terminated by signal {sig}"),
            Termination::Exited(code) => write!(f, "process exited with status {code}"),
            Termination::Other(what) => write!(f, "process ended: {what}"),
        }
    }
}

/// Reap `pid` if it has terminated, without blocking.
pub fn try_reap(pid: Pid) -> Result<Option<Termination>, Error> {
    let status = match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => status,
        Err(Errno::ECHILD) => return Ok(Some(Termination::Other("no such child".to_string()))),
        Err(Errno::EINTR) => return Ok(None),
        Err(e) => return Err(Error::Syscall("waitpid", e)),
    };

    let termination = match status {
        WaitStatus::StillAlive => return Ok(None),
        WaitStatus::Exited(_, code) => Termination::Exited(code),
        WaitStatus::Signaled(_, sig, true) => Termination::CoreDump(sig),
        WaitStatus::Signaled(_, sig, false) => Termination::Signaled(sig),
        // stopped or continued: still alive
        WaitStatus::Stopped(..) | WaitStatus::Continued(_) => return Ok(None),
        other => Termination::Other(format!("{other:?}")),
    };
    log::info!(target: "proc", "pid {pid}: {termination}");
    Ok(Some(termination))
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;
    use std::process::Command;
    use std::time::{Duration, Instant};

    fn reap_within(pid: Pid, timeout: Duration) -> Termination {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(t) = try_reap(pid).unwrap() {
                return t;
            }
            assert!(Instant::now() < deadline, "child not reaped");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    #[serial]
    fn test_single_watch() {
        let watch = ChildWatch::install().unwrap();
        assert!(matches!(ChildWatch::install(), Err(Error::ChannelOverlap)));
        drop(watch);
        let watch = ChildWatch::install().unwrap();
        drop(watch);
    }

    #[test]
    #[serial]
    fn test_sigchld_wakes_watch() {
        let mut watch = ChildWatch::install().unwrap();
        let child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        let ready = sys::poll_readable(&[watch.fd()], Some(Duration::from_secs(5))).unwrap();
        assert_eq!(ready, vec![true]);
        watch.drain();
        assert_eq!(reap_within(pid, Duration::from_secs(5)), Termination::Exited(3));
    }

    #[test]
    #[serial]
    fn test_classify_signaled() {
        let child = Command::new("sleep").arg("10").spawn().unwrap();
        let pid = Pid::from_raw(child.id() as i32);
        assert_eq!(try_reap(pid).unwrap(), None);

        nix::sys::signal::kill(pid, Signal::SIGTERM).unwrap();
        assert_eq!(
            reap_within(pid, Duration::from_secs(5)),
            Termination::Signaled(Signal::SIGTERM)
        );
        assert_eq!(
            Termination::Exited(0).to_string(),
            "process exited with status 0"
        );
    }
}
