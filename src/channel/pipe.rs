//! Fallback spawn of the subordinate over anonymous pipes.

use crate::channel::sys;
use os_pipe::{PipeReader, PipeWriter};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Subordinate process talking over pipes, stderr is merged into stdout.
pub struct PipeChild {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: PipeReader,
}

pub fn spawn(argv: &[String]) -> io::Result<PipeChild> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"))?;

    let (stdout_reader, stdout_writer) = os_pipe::pipe()?;
    let stderr_writer = stdout_writer.try_clone()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(stdout_writer)
        .stderr(stderr_writer);
    let mut child = cmd.spawn()?;
    // the writer ends must be closed here, otherwise the reader never sees end of file
    drop(cmd);

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "no stdin pipe"))?;

    log::debug!(target: "proc", "spawned {program} (pid {}) over pipes", child.id());
    Ok(PipeChild {
        child,
        stdin,
        stdout: stdout_reader,
    })
}

const POLL_PERIOD: Duration = Duration::from_millis(200);

/// Watches a descriptor from a helper thread and raises a wake up byte when it becomes
/// readable. The thread does not read the descriptor: after each wake up it waits for an
/// acknowledgment from the event loop before it polls again.
pub struct ReadinessPoller {
    wake: PipeReader,
    ack: Option<Sender<()>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ReadinessPoller {
    pub fn start(fd: RawFd) -> io::Result<Self> {
        let (wake_reader, mut wake_writer): (PipeReader, PipeWriter) = os_pipe::pipe()?;
        let (ack_tx, ack_rx) = mpsc::channel::<()>();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        let handle = thread::Builder::new()
            .name("readiness-poller".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Acquire) {
                    let ready = match sys::poll_readable(&[fd], Some(POLL_PERIOD)) {
                        Ok(ready) => ready[0],
                        Err(e) => {
                            log::error!(target: "proc", "readiness poller: {e:#}");
                            return;
                        }
                    };
                    if !ready {
                        continue;
                    }
                    if wake_writer.write_all(b"r").is_err() {
                        return;
                    }
                    // wait until the event loop has consumed the data
                    loop {
                        match ack_rx.recv_timeout(POLL_PERIOD) {
                            Ok(()) => break,
                            Err(RecvTimeoutError::Timeout) => {
                                if thread_stop.load(Ordering::Acquire) {
                                    return;
                                }
                            }
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }
                }
            })?;

        Ok(Self {
            wake: wake_reader,
            ack: Some(ack_tx),
            stop,
            handle: Some(handle),
        })
    }

    /// Descriptor that becomes readable when the watched descriptor is.
    pub fn wake_fd(&self) -> RawFd {
        self.wake.as_raw_fd()
    }

    /// Consume the wake up byte, must be followed by [`ReadinessPoller::ack`] once the
    /// watched descriptor has been read.
    pub fn take_wake(&mut self) -> io::Result<()> {
        let mut buf = [0; 1];
        self.wake.read_exact(&mut buf)
    }

    /// Let the poller watch the descriptor again.
    pub fn ack(&self) {
        if let Some(ack) = &self.ack {
            _ = ack.send(());
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.ack.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!(target: "proc", "readiness poller panicked");
            }
        }
    }
}

impl Drop for ReadinessPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
