//! Single threaded event loop.
//!
//! The loop multiplexes three descriptors: output of the subordinate, the child termination
//! notification and the editor input. Everything it reads is handed to [`Hooks`], which own all
//! protocol state, so the hooks never see the multiplexing mechanism.

use crate::channel::line::LineBuffer;
use crate::channel::reaper::Termination;
use crate::channel::{sys, SessionChannel};
use crate::error::Error;
use std::io::{self, Read};
use std::os::fd::AsRawFd;

/// Callbacks of the event loop.
pub trait Hooks {
    /// A line written by the subordinate.
    fn on_line(&mut self, line: &str, channel: &mut SessionChannel) -> Result<(), Error>;

    /// A line received from the editor.
    fn on_editor_line(&mut self, line: &str, channel: &mut SessionChannel) -> Result<(), Error>;

    /// The subordinate has terminated and was reaped.
    fn on_process_exit(&mut self, termination: &Termination);
}

/// Why the event loop returned.
#[derive(Debug, PartialEq)]
pub enum Exit {
    ProcessExited(Termination),
    EditorClosed,
}

pub struct EventLoop<E: Read + AsRawFd> {
    editor: E,
    editor_lines: LineBuffer,
}

impl<E: Read + AsRawFd> EventLoop<E> {
    pub fn new(editor: E) -> Self {
        Self {
            editor,
            editor_lines: LineBuffer::default(),
        }
    }

    /// Dispatch events until the subordinate terminates or the editor goes away.
    pub fn run(
        &mut self,
        channel: &mut SessionChannel,
        hooks: &mut impl Hooks,
    ) -> Result<Exit, Error> {
        let mut output_open = true;
        loop {
            let output_fd = channel.poll_fd().filter(|_| output_open);
            let mut fds = vec![channel.sigchld_fd(), self.editor.as_raw_fd()];
            fds.extend(output_fd);

            let ready = sys::poll_readable(&fds, None)?;

            // output first, a terminating child may still have lines to deliver
            if ready.get(2).copied().unwrap_or_default() {
                let inbound = channel.on_poll_ready()?;
                for line in &inbound.lines {
                    dispatch(hooks.on_line(line, channel))?;
                }
                if inbound.eof {
                    output_open = false;
                }
            }

            if ready[0] {
                if let Some(termination) = channel.try_reap()?.cloned() {
                    if output_open {
                        self.drain_output(channel, hooks)?;
                    }
                    hooks.on_process_exit(&termination);
                    return Ok(Exit::ProcessExited(termination));
                }
            }

            if ready[1] {
                let mut buf = [0; 4096];
                let n = match self.editor.read(&mut buf) {
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(Error::IO(e)),
                };
                if n == 0 {
                    log::info!(target: "bridge", "editor closed its input");
                    let last = self.editor_lines.flush();
                    for line in last.iter() {
                        dispatch(hooks.on_editor_line(line, channel))?;
                    }
                    return Ok(Exit::EditorClosed);
                }
                for line in self.editor_lines.push(&buf[..n]) {
                    dispatch(hooks.on_editor_line(&line, channel))?;
                }
            }
        }
    }

    /// Deliver output still buffered after the subordinate terminated.
    fn drain_output(
        &mut self,
        channel: &mut SessionChannel,
        hooks: &mut impl Hooks,
    ) -> Result<(), Error> {
        while let Some(fd) = channel.poll_fd() {
            let ready = sys::poll_readable(&[fd], Some(std::time::Duration::from_millis(100)))?;
            if !ready[0] {
                break;
            }
            let inbound = channel.on_poll_ready()?;
            for line in &inbound.lines {
                dispatch(hooks.on_line(line, channel))?;
            }
            if inbound.eof {
                break;
            }
        }
        Ok(())
    }
}

/// Non fatal errors of a hook are logged, fatal ones stop the loop.
fn dispatch(result: Result<(), Error>) -> Result<(), Error> {
    match result {
        Err(e) if e.is_fatal() => Err(e),
        res => {
            crate::weak_error!(res);
            Ok(())
        }
    }
}
