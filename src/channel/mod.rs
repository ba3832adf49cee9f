//! Session channel: the subordinate debugger process and its byte streams.
//!
//! The debugger runs on a pseudo terminal when one can be set up, otherwise on anonymous pipes.
//! Output is delivered as whole lines, termination is noticed through SIGCHLD.

pub mod line;
pub mod pipe;
pub mod pty;
pub mod reaper;
pub mod sys;

use crate::engine::CommandWriter;
use crate::error::Error;
use line::LineBuffer;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use os_pipe::PipeReader;
use pipe::{PipeChild, ReadinessPoller};
use pty::PtyChild;
use reaper::{ChildWatch, Termination};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::ChildStdin;
use std::time::{Duration, Instant};

/// Time given to the subordinate to exit by itself on close.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

enum Transport {
    Pty {
        master: File,
        ttyname: PathBuf,
    },
    Pipe {
        stdin: ChildStdin,
        stdout: PipeReader,
        poller: ReadinessPoller,
    },
}

/// Outcome of an interrupt request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The interrupt character was written to the terminal.
    Sent,
    /// No controlling terminal, nothing was sent.
    Degraded,
}

/// Data read after a readiness notification.
#[derive(Debug, Default, PartialEq)]
pub struct Inbound {
    pub lines: Vec<String>,
    /// The subordinate closed its output, `lines` holds the last incomplete line if any.
    pub eof: bool,
}

pub struct SessionChannel {
    pid: Pid,
    transport: Option<Transport>,
    lines: LineBuffer,
    watch: ChildWatch,
    termination: Option<Termination>,
}

impl SessionChannel {
    /// Spawn `argv`, on a pseudo terminal unless `force_pipes` is set or the pseudo terminal
    /// can not be set up.
    pub fn start(argv: &[String], force_pipes: bool) -> Result<Self, Error> {
        Self::start_with(argv, force_pipes, pty::spawn)
    }

    /// Like [`SessionChannel::start`], with `pty_spawn` setting up the pseudo terminal.
    pub fn start_with(
        argv: &[String],
        force_pipes: bool,
        pty_spawn: impl FnOnce(&[String]) -> io::Result<PtyChild>,
    ) -> Result<Self, Error> {
        let program = argv.first().cloned().unwrap_or_default();
        // installed first, the termination of a short lived child must not be missed
        let watch = ChildWatch::install()?;

        let pty = if force_pipes {
            log::info!(target: "proc", "pipes requested, no pseudo terminal");
            None
        } else {
            match pty_spawn(argv) {
                Ok(pty) => Some(pty),
                Err(e) => {
                    log::info!(target: "proc", "cannot spawn on a pseudo terminal ({e}), using pipes");
                    None
                }
            }
        };

        let (pid, transport) = match pty {
            Some(PtyChild {
                child,
                master,
                ttyname,
            }) => (child.id(), Transport::Pty { master, ttyname }),
            None => {
                let PipeChild {
                    child,
                    stdin,
                    stdout,
                } = pipe::spawn(argv).map_err(|e| Error::Spawn(program.clone(), e))?;
                let poller = ReadinessPoller::start(stdout.as_raw_fd())?;
                (
                    child.id(),
                    Transport::Pipe {
                        stdin,
                        stdout,
                        poller,
                    },
                )
            }
        };

        Ok(Self {
            pid: Pid::from_raw(pid as i32),
            transport: Some(transport),
            lines: LineBuffer::default(),
            watch,
            termination: None,
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Terminal of the subordinate, none in pipe mode.
    pub fn ttyname(&self) -> Option<&Path> {
        match &self.transport {
            Some(Transport::Pty { ttyname, .. }) => Some(ttyname.as_path()),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Descriptor that becomes readable when output of the subordinate is available.
    pub fn poll_fd(&self) -> Option<RawFd> {
        match &self.transport {
            Some(Transport::Pty { master, .. }) => Some(master.as_raw_fd()),
            Some(Transport::Pipe { poller, .. }) => Some(poller.wake_fd()),
            None => None,
        }
    }

    /// Descriptor that becomes readable on child termination.
    pub fn sigchld_fd(&self) -> RawFd {
        self.watch.fd()
    }

    /// Read what is available and return the completed lines.
    pub fn on_poll_ready(&mut self) -> Result<Inbound, Error> {
        let mut data = vec![];
        let mut buf = [0; 4096];
        let eof = match self.transport.as_mut() {
            None => true,
            Some(Transport::Pty { master, .. }) => loop {
                match master.read(&mut buf) {
                    Ok(0) => break true,
                    Ok(n) => data.extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break false,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    // the slave side is closed
                    Err(e) if e.raw_os_error() == Some(nix::libc::EIO) => break true,
                    Err(e) => return Err(Error::IO(e)),
                }
            },
            Some(Transport::Pipe { stdout, poller, .. }) => {
                poller.take_wake()?;
                let eof = loop {
                    match stdout.read(&mut buf) {
                        Ok(0) => break true,
                        Ok(n) => {
                            data.extend_from_slice(&buf[..n]);
                            break false;
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(Error::IO(e)),
                    }
                };
                poller.ack();
                eof
            }
        };

        let mut lines = self.lines.push(&data);
        if eof {
            log::debug!(target: "proc", "end of file on the subordinate output");
            lines.extend(self.lines.flush());
        }
        Ok(Inbound { lines, eof })
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        match self.transport.as_mut() {
            None => Err(Error::ChannelClosed),
            Some(Transport::Pty { master, .. }) => write_nonblocking(master, bytes),
            Some(Transport::Pipe { stdin, .. }) => Ok(stdin.write_all(bytes)?),
        }
    }

    /// Interrupt the subordinate with the terminal interrupt character.
    pub fn interrupt(&mut self) -> Result<Interrupt, Error> {
        match self.transport.as_mut() {
            None => Err(Error::ChannelClosed),
            Some(Transport::Pty { master, .. }) => {
                write_nonblocking(master, &[pty::INTR])?;
                Ok(Interrupt::Sent)
            }
            Some(Transport::Pipe { .. }) => Ok(Interrupt::Degraded),
        }
    }

    /// Reap the subordinate if it has terminated.
    pub fn try_reap(&mut self) -> Result<Option<&Termination>, Error> {
        self.watch.drain();
        if self.termination.is_none() {
            self.termination = reaper::try_reap(self.pid)?;
        }
        Ok(self.termination.as_ref())
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    /// Stop output delivery, close the descriptors and reap the subordinate, killing it when it
    /// does not exit in time.
    pub fn close(&mut self) -> Option<Termination> {
        if let Some(Transport::Pipe { mut poller, .. }) = self.transport.take() {
            poller.stop();
        }

        let deadline = Instant::now() + CLOSE_GRACE;
        while self.termination.is_none() {
            match self.try_reap() {
                Ok(Some(_)) => break,
                Ok(None) => {}
                Err(e) => {
                    log::warn!(target: "proc", "{e:#}");
                    break;
                }
            }
            if Instant::now() >= deadline {
                log::info!(target: "proc", "pid {} still alive, killing it", self.pid);
                _ = crate::weak_error!(signal::kill(self.pid, Signal::SIGKILL), "kill:");
                _ = crate::weak_error!(nix::sys::wait::waitpid(self.pid, None), "waitpid:");
                self.termination = Some(Termination::Signaled(Signal::SIGKILL));
                break;
            }
            _ = sys::poll_readable(&[self.watch.fd()], Some(Duration::from_millis(20)));
        }
        self.termination.clone()
    }
}

impl CommandWriter for SessionChannel {
    fn write_line(&mut self, line: &str) -> Result<(), Error> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.write(&bytes)
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        if self.transport.is_some() || self.termination.is_none() {
            self.close();
        }
    }
}

/// Write all of `bytes` to a non blocking descriptor.
fn write_nonblocking(file: &mut File, mut bytes: &[u8]) -> Result<(), Error> {
    while !bytes.is_empty() {
        match file.write(bytes) {
            Ok(0) => return Err(Error::IO(io::ErrorKind::WriteZero.into())),
            Ok(n) => bytes = &bytes[n..],
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(1));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::IO(e)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use serial_test::serial;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(ToString::to_string).collect()
    }

    /// Collect lines until `n` lines are read or end of file.
    fn read_lines(channel: &mut SessionChannel, n: usize) -> Inbound {
        let mut inbound = Inbound::default();
        while inbound.lines.len() < n && !inbound.eof {
            let fd = channel.poll_fd().unwrap();
            let ready = sys::poll_readable(&[fd], Some(Duration::from_secs(5))).unwrap();
            assert!(ready[0], "no output from the subordinate");
            let mut chunk = channel.on_poll_ready().unwrap();
            inbound.lines.append(&mut chunk.lines);
            inbound.eof = chunk.eof;
        }
        inbound
    }

    #[test]
    #[serial]
    fn test_pipe_round_trip() {
        let mut channel = SessionChannel::start(&argv(&["cat"]), true).unwrap();
        assert_eq!(channel.ttyname(), None);

        channel.write_line("1-break-list").unwrap();
        channel.write(b"(gdb) \n~\"partial").unwrap();
        let inbound = read_lines(&mut channel, 2);
        assert_eq!(inbound.lines, vec!["1-break-list", "(gdb) "]);

        assert_eq!(channel.interrupt().unwrap(), Interrupt::Degraded);
        assert_eq!(channel.close(), Some(Termination::Exited(0)));
        assert!(matches!(channel.write(b"x"), Err(Error::ChannelClosed)));
    }

    #[test]
    #[serial]
    fn test_eof_flushes_partial_line() {
        let mut channel =
            SessionChannel::start(&argv(&["sh", "-c", "printf 'a\\nb'"]), true).unwrap();
        let inbound = read_lines(&mut channel, usize::MAX);
        assert!(inbound.eof);
        assert_eq!(inbound.lines, vec!["a", "b"]);

        let ready = sys::poll_readable(&[channel.sigchld_fd()], Some(Duration::from_secs(5)));
        assert_eq!(ready.unwrap(), vec![true]);
        let deadline = Instant::now() + Duration::from_secs(5);
        while channel.try_reap().unwrap().is_none() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(channel.termination(), Some(&Termination::Exited(0)));
    }

    #[test]
    #[serial]
    fn test_pty_failure_falls_back_to_pipes() {
        let no_pty = |_: &[String]| -> io::Result<PtyChild> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no pseudo terminal"))
        };
        let mut channel = SessionChannel::start_with(&argv(&["cat"]), false, no_pty).unwrap();
        assert_eq!(channel.ttyname(), None);

        channel.write_line("(gdb) ").unwrap();
        assert_eq!(read_lines(&mut channel, 1).lines, vec!["(gdb) "]);
        assert_eq!(channel.interrupt().unwrap(), Interrupt::Degraded);
        assert_eq!(channel.close(), Some(Termination::Exited(0)));
    }

    #[test]
    #[serial]
    fn test_close_kills_stubborn_child() {
        let mut channel = SessionChannel::start(&argv(&["sleep", "30"]), true).unwrap();
        assert_eq!(
            channel.close(),
            Some(Termination::Signaled(Signal::SIGKILL))
        );
    }

    #[test]
    #[serial]
    fn test_spawn_failure() {
        let res = SessionChannel::start(&argv(&["/nonexistent/debugger"]), false);
        assert!(matches!(res, Err(Error::Spawn(..))));
        // the notification is released on failure
        let channel = SessionChannel::start(&argv(&["true"]), true).unwrap();
        drop(channel);
    }

    #[test]
    #[serial]
    fn test_pty_interrupt() {
        let Ok(mut channel) = SessionChannel::start(&argv(&["cat"]), false) else {
            return;
        };
        if channel.ttyname().is_none() {
            return;
        }
        assert_eq!(channel.interrupt().unwrap(), Interrupt::Sent);
        // cat is killed by the terminal generated SIGINT
        let deadline = Instant::now() + Duration::from_secs(5);
        while channel.try_reap().unwrap().is_none() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(
            channel.termination(),
            Some(&Termination::Signaled(Signal::SIGINT))
        );
        channel.close();
    }
}
