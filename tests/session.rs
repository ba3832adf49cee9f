mod common;

use mibridge::channel::reaper::Termination;
use mibridge::channel::{sys, SessionChannel};
use mibridge::engine::Engine;
use mibridge::link::Recorder;
use mibridge::session::Session;
use mibridge::table::CommandTable;
use serial_test::serial;
use std::path::Path;
use std::time::{Duration, Instant};

fn start(force_pipes: bool) -> (SessionChannel, Session<Recorder>) {
    let pgm = common::fake_gdb();
    let table = CommandTable::introspect(pgm).unwrap();
    let channel = SessionChannel::start(&[pgm.to_string()], force_pipes).unwrap();
    let session = Session::new(Engine::default(), table, Recorder::default());
    (channel, session)
}

/// Feed the debugger output to the session until `done` holds.
fn pump(
    channel: &mut SessionChannel,
    session: &mut Session<Recorder>,
    done: impl Fn(&Session<Recorder>) -> bool,
) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(session) {
        assert!(Instant::now() < deadline, "timeout, state:\n{}", session.engine().dump());
        let fd = channel.poll_fd().unwrap();
        if !sys::poll_readable(&[fd], Some(Duration::from_millis(100))).unwrap()[0] {
            continue;
        }
        let inbound = channel.on_poll_ready().unwrap();
        for line in &inbound.lines {
            session.handle_line(line, channel).unwrap();
        }
        assert!(!inbound.eof, "debugger output closed");
    }
}

#[test]
#[serial]
fn test_pipe_fallback_degrades_interrupt() {
    let (mut channel, mut session) = start(true);
    assert_eq!(channel.ttyname(), None);

    pump(&mut channel, &mut session, |s| s.engine().is_idle());
    let bp = session.markers().breakpoint("1").unwrap();
    assert_eq!((bp.path, bp.line), (Path::new("/src/a.c"), 42));

    session.dispatch("sigint", &mut channel).unwrap();
    assert!(session.link().console.contains("cannot be interrupted"));
    assert!(session.engine().pending().is_empty());

    let termination = session.close(&mut channel);
    assert_eq!(termination, Some(Termination::Exited(0)));
    assert!(session.markers().breakpoint_ids().is_empty());
    assert_eq!(session.link().names().last(), Some(&"removeAnno"));
}

#[test]
#[serial]
fn test_command_after_batch() {
    let (mut channel, mut session) = start(true);

    // typed before the first prompt
    session.dispatch("info x", &mut channel).unwrap();
    session.dispatch("shell ls", &mut channel).unwrap();
    assert!(session.link().console.starts_with("Illegal command.\n"));

    pump(&mut channel, &mut session, |s| {
        s.link().console.ends_with("info x\nok\n(gdb) ")
    });
    assert_eq!(session.engine().deferred().count(), 0);
    // the batch that follows the command runs too
    pump(&mut channel, &mut session, |s| s.engine().is_idle());

    session.close(&mut channel);
}

#[test]
#[serial]
fn test_pty_session() {
    let (mut channel, mut session) = start(false);
    if channel.ttyname().is_none() {
        // no pseudo terminal support in this environment
        session.close(&mut channel);
        return;
    }

    pump(&mut channel, &mut session, |s| s.engine().is_idle());
    session.dispatch("step", &mut channel).unwrap();
    pump(&mut channel, &mut session, |s| {
        s.link().console.ends_with("step\nok\n(gdb) ")
    });
    assert!(session.close(&mut channel).is_some());
}
