//! Spawn of the subordinate attached to a pseudo terminal.

use crate::channel::sys;
use nix::libc;
use nix::pty::{openpty, OpenptyResult};
use nix::sys::termios::{self, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices};
use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

/// Control character sent through the terminal to interrupt the subordinate.
pub const INTR: u8 = 0x03;

/// Open a pseudo terminal pair, return (master, slave).
fn open_pty() -> io::Result<(File, File)> {
    let OpenptyResult { master, slave } = openpty(None, None)?;
    let (master, slave) = (File::from(master), File::from(slave));
    sys::set_cloexec(master.as_raw_fd())?;
    sys::set_cloexec(slave.as_raw_fd())?;
    Ok((master, slave))
}

/// No echo, no NL to CR-NL translation and `^C` as the interrupt character.
fn raw_mode(slave: &File) -> io::Result<()> {
    let mut attrs = termios::tcgetattr(slave)?;
    attrs.output_flags.remove(OutputFlags::ONLCR);
    attrs.local_flags.remove(LocalFlags::ECHO | LocalFlags::ECHONL);
    attrs.control_chars[SpecialCharacterIndices::VINTR as usize] = INTR as libc::cc_t;
    termios::tcsetattr(slave, SetArg::TCSANOW, &attrs)?;
    Ok(())
}

/// Subordinate process running on a pseudo terminal.
pub struct PtyChild {
    pub child: Child,
    pub master: File,
    pub ttyname: PathBuf,
}

/// Spawn `argv` with its standard streams on the slave side of a new pseudo terminal, the
/// slave becomes the controlling terminal of the new session.
pub fn spawn(argv: &[String]) -> io::Result<PtyChild> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"))?;

    let (master, slave) = open_pty()?;
    raw_mode(&slave)?;
    let ttyname = nix::unistd::ttyname(slave.as_raw_fd())?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::from(slave.try_clone()?))
        .stdout(Stdio::from(slave.try_clone()?))
        .stderr(Stdio::from(slave));
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()?;
            if libc::ioctl(0, libc::TIOCSCTTY as _, 0) < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    let child = cmd.spawn()?;
    sys::set_nonblocking(master.as_raw_fd())?;

    log::debug!(target: "proc", "spawned {program} (pid {}) on {ttyname:?}", child.id());
    Ok(PtyChild {
        child,
        master,
        ttyname,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Read;
    use std::time::Duration;

    #[test]
    fn test_spawn_on_pty() {
        let argv = ["sh", "-c", "tty; printf 'a\\nb\\n'"]
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        let Ok(PtyChild {
            mut child,
            mut master,
            ttyname,
        }) = spawn(&argv)
        else {
            // no pseudo terminal support in this environment
            return;
        };
        assert!(ttyname.starts_with("/dev/pts"));

        let mut out = vec![];
        let mut buf = [0; 256];
        loop {
            sys::poll_readable(&[master.as_raw_fd()], Some(Duration::from_secs(5))).unwrap();
            match master.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                // EIO once the slave side is closed
                Err(_) => break,
            }
        }
        child.wait().unwrap();

        let out = String::from_utf8(out).unwrap();
        // no carriage returns: output post processing is off
        assert_eq!(out, format!("{}\na\nb\n", ttyname.display()));
    }

    #[test]
    fn test_spawn_unknown_program() {
        let argv = vec!["/nonexistent/program".to_string()];
        assert!(spawn(&argv).is_err());
        assert!(spawn(&[]).is_err());
    }
}
