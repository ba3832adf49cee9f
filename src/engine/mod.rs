//! Request/response state machine on top of the debugger machine interface.
//!
//! Exactly one command is outstanding at any time. After each interactive command the engine
//! runs a batch of out of band (oob) commands, one per prompt cycle, and only then releases the
//! next interactive command line that was queued meanwhile.

pub mod oob;
pub mod result;

use crate::error::Error;
use crate::link::EditorLink;
use crate::marker::MarkerStore;
use crate::mi::{self, value, AsyncKind, Record};
use oob::{DebugState, OobCommand, OobCursor};
use result::{Command, ResultTable};
use std::collections::VecDeque;
use std::fmt::Write as _;

/// Destination of formatted commands.
pub trait CommandWriter {
    /// Write one command line, the line terminator is added by the writer.
    fn write_line(&mut self, line: &str) -> Result<(), Error>;
}

impl CommandWriter for Vec<String> {
    fn write_line(&mut self, line: &str) -> Result<(), Error> {
        self.push(line.to_string());
        Ok(())
    }
}

/// State that result handlers mutate.
pub struct Context<'a> {
    pub markers: &'a mut MarkerStore,
    pub link: &'a mut dyn EditorLink,
}

pub struct Engine {
    next_token: u64,
    results: ResultTable,
    stream: String,
    /// Last command whose result was processed.
    last: Option<Command>,
    ready: bool,
    started: bool,
    batch: Vec<OobCommand>,
    oob: Option<OobCursor>,
    /// Interactive command lines waiting for the end of the current cycle.
    deferred: VecDeque<String>,
    /// Set by a stop of the debuggee, a new batch runs at the next prompt.
    refresh: bool,
    state: DebugState,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(OobCommand::BATCH.to_vec())
    }
}

impl Engine {
    /// Create an engine running `batch` once per prompt cycle.
    pub fn new(batch: Vec<OobCommand>) -> Self {
        Self {
            next_token: 1,
            results: ResultTable::default(),
            stream: String::new(),
            last: None,
            ready: false,
            started: false,
            batch,
            oob: None,
            deferred: VecDeque::new(),
            refresh: false,
            state: DebugState::default(),
        }
    }

    /// True when the debugger has shown its first prompt.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True when the debugger waits for a command and no batch is running.
    pub fn is_idle(&self) -> bool {
        self.started && self.ready && self.oob.is_none()
    }

    pub fn state(&self) -> &DebugState {
        &self.state
    }

    pub fn pending(&self) -> &ResultTable {
        &self.results
    }

    pub fn deferred(&self) -> impl Iterator<Item = &String> {
        self.deferred.iter()
    }

    /// Assign a token to `command`, register it as pending and write it.
    pub fn send(&mut self, command: Command, writer: &mut dyn CommandWriter) -> Result<u64, Error> {
        let token = self.next_token;
        self.next_token += 1;

        let line = command.format(token);
        log::debug!(target: "mi", "send: {line}");
        writer.write_line(&line)?;
        self.results.insert(token, command);
        self.ready = false;
        Ok(token)
    }

    /// Send an interactive command line now when idle, queue it otherwise.
    pub fn submit_interactive(
        &mut self,
        line: &str,
        writer: &mut dyn CommandWriter,
        link: &mut dyn EditorLink,
    ) -> Result<(), Error> {
        if !self.is_idle() {
            log::debug!(target: "mi", "busy, command deferred: {line}");
            self.deferred.push_back(line.to_string());
            return Ok(());
        }
        link.console_print(&format!("{line}\n"));
        self.send(Command::Cli(line.to_string()), writer)?;
        Ok(())
    }

    /// Start a fresh oob batch.
    pub fn run_oob_batch(&mut self) {
        self.refresh = false;
        self.oob = Some(OobCursor::new(self.batch.clone()));
    }

    /// Process one line written by the debugger.
    pub fn on_line(
        &mut self,
        line: &str,
        writer: &mut dyn CommandWriter,
        ctx: &mut Context,
    ) -> Result<(), Error> {
        let record = match mi::parse_line(line) {
            Ok(record) => record,
            Err(e) => {
                log::error!(target: "mi", "{e}");
                return Ok(());
            }
        };

        match record {
            Record::Stream { text, .. } => self.stream.push_str(&text),
            Record::Result {
                token,
                class,
                payload,
            } => {
                // exec records may carry the token of the command that resumed the debuggee
                if class == '*' {
                    self.on_exec_async(&payload);
                }
                match self.results.remove(token) {
                    Some(command) => {
                        let (stream, state) = (&mut self.stream, &mut self.state);
                        command.handle_result(class, &payload, stream, state, ctx);
                        self.last = Some(command);
                    }
                    None => {
                        log::debug!(target: "mi", "no pending command for token {token}: {line}")
                    }
                }
            }
            Record::Async { kind, payload } => {
                log::debug!(target: "mi", "async record: {line}");
                if kind == AsyncKind::Exec {
                    self.on_exec_async(&payload);
                }
            }
            Record::Prompt => self.prompt_cycle(writer, ctx)?,
        }
        Ok(())
    }

    /// A stop of the debuggee schedules a new batch at the next prompt.
    fn on_exec_async(&mut self, payload: &str) {
        let Some((class, results)) = crate::weak_error!(value::parse_async(payload)) else {
            return;
        };
        if class == "stopped" {
            let reason = results
                .iter()
                .find(|(name, _)| name == "reason")
                .and_then(|(_, v)| v.as_str())
                .unwrap_or("unknown");
            log::debug!(target: "mi", "debuggee stopped: {reason}");
            self.refresh = true;
        }
    }

    fn prompt_cycle(&mut self, writer: &mut dyn CommandWriter, ctx: &mut Context) -> Result<(), Error> {
        let stream = std::mem::take(&mut self.stream);
        match &self.last {
            Some(command) => command.handle_stream(&stream, ctx),
            None => Command::Cli(String::new()).handle_stream(&stream, ctx),
        }

        let interactive = self.last.as_ref().map_or(true, Command::is_cli);
        if interactive || (self.refresh && self.oob.is_none()) {
            if interactive {
                ctx.link.console_print(mi::PROMPT);
            }
            if !self.results.is_empty() {
                log::error!(
                    target: "mi",
                    "all commands have not been processed in results: {}",
                    self.results.iter().map(|(t, c)| format!("{t}:{c}")).collect::<Vec<_>>().join(", ")
                );
            }
            self.run_oob_batch();
        }
        self.started = true;
        self.ready = true;

        let Some(cursor) = self.oob.as_mut() else {
            return Ok(());
        };
        match cursor.advance() {
            Some(cmd) => {
                self.send(Command::Oob(cmd), writer)?;
            }
            None => {
                log::info!(
                    target: "mi",
                    "oob commands execution: {:?}",
                    cursor.started().elapsed()
                );
                self.oob = None;
                // output that comes later without a command of its own goes to the console
                self.last = None;
                if let Some(line) = self.deferred.pop_front() {
                    ctx.link.console_print(&format!("{line}\n"));
                    self.send(Command::Cli(line), writer)?;
                }
            }
        }
        Ok(())
    }

    /// Human readable state, for diagnostics.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        _ = writeln!(out, "next token: {}", self.next_token);
        _ = writeln!(out, "ready: {}, started: {}", self.ready, self.started);
        _ = writeln!(
            out,
            "last command: {}",
            self.last.as_ref().map(ToString::to_string).unwrap_or_default()
        );
        for (token, command) in self.results.iter() {
            _ = writeln!(out, "pending {token}: {command}");
        }
        if let Some(cursor) = &self.oob {
            _ = writeln!(out, "oob batch at {}/{}", cursor.position(), self.batch.len());
        }
        for line in &self.deferred {
            _ = writeln!(out, "deferred: {line}");
        }
        if let Some((path, line)) = &self.state.frame {
            _ = writeln!(out, "frame: {}:{line}", path.display());
        }
        if let Some((path, line)) = &self.state.source {
            _ = writeln!(out, "source: {}:{line}", path.display());
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::link::Recorder;
    use std::path::{Path, PathBuf};

    struct Harness {
        engine: Engine,
        writer: Vec<String>,
        markers: MarkerStore,
        link: Recorder,
    }

    impl Harness {
        fn new(batch: Vec<OobCommand>) -> Self {
            Self {
                engine: Engine::new(batch),
                writer: vec![],
                markers: MarkerStore::new(),
                link: Recorder::default(),
            }
        }

        fn feed(&mut self, line: &str) {
            let mut ctx = Context {
                markers: &mut self.markers,
                link: &mut self.link,
            };
            self.engine
                .on_line(line, &mut self.writer, &mut ctx)
                .unwrap();
        }

        fn submit(&mut self, line: &str) {
            self.engine
                .submit_interactive(line, &mut self.writer, &mut self.link)
                .unwrap();
        }

        fn last_written(&self) -> &str {
            self.writer.last().map(String::as_str).unwrap_or_default()
        }
    }

    #[test]
    fn test_duplicate_token_dropped() {
        let mut h = Harness::new(vec![]);
        h.feed("(gdb) ");
        for _ in 0..11 {
            h.engine.send(Command::Cli("p 1".to_string()), &mut h.writer).unwrap();
        }
        let token = h
            .engine
            .send(Command::Oob(OobCommand::SourceFile), &mut h.writer)
            .unwrap();
        assert_eq!(token, 12);
        assert_eq!(h.last_written(), "12-file-list-exec-source-file");

        h.feed(r#"12^done,fullname="/src/a.c",line="5""#);
        assert_eq!(
            h.engine.state().source,
            Some((PathBuf::from("/src/a.c"), 5))
        );
        assert_eq!(h.engine.pending().len(), 11);

        h.engine.state.source = None;
        h.feed(r#"12^done,fullname="/src/a.c",line="5""#);
        assert_eq!(h.engine.state().source, None);
        assert_eq!(h.engine.pending().len(), 11);
    }

    #[test]
    fn test_interactive_waits_for_batch() {
        let mut h = Harness::new(OobCommand::BATCH.to_vec());

        // commands typed before the first prompt are deferred too
        h.submit("info frame");
        assert!(h.writer.is_empty());

        h.feed(r#"~"GNU gdb (GDB) 13.2\n""#);
        h.feed("(gdb) ");
        assert_eq!(h.writer, vec!["1-break-list"]);
        assert_eq!(h.link.console, "GNU gdb (GDB) 13.2\n(gdb) ");

        h.submit("next");
        h.feed(r#"1^done,BreakpointTable={nr_rows="0",nr_cols="6",body=[]}"#);
        h.feed("(gdb) ");
        assert_eq!(h.last_written(), "2-stack-info-frame");

        h.feed(r#"2^error,msg="No stack.""#);
        h.feed("(gdb) ");
        assert_eq!(h.last_written(), "3-file-list-exec-source-file");
        assert_eq!(h.writer.len(), 3);

        h.feed(r#"3^error,msg="No symbol table is loaded.""#);
        h.feed("(gdb) ");
        assert_eq!(h.writer.len(), 4);
        assert_eq!(
            h.last_written(),
            r#"4-interpreter-exec console "info frame""#
        );
        assert_eq!(h.engine.deferred().count(), 1);
        // oob errors are not shown on the console
        assert!(!h.link.console.contains("No stack"));

        h.feed(r#"&"No stack.\n""#);
        h.feed(r#"4^error,msg="No stack.""#);
        h.feed("(gdb) ");
        assert!(h.link.console.ends_with("info frame\nNo stack.\n(gdb) "));
        assert_eq!(h.last_written(), "5-break-list");
    }

    #[test]
    fn test_idle_engine_sends_at_once() {
        let mut h = Harness::new(vec![OobCommand::StackFrame]);
        h.feed("(gdb) ");
        h.feed(r#"1^done,frame={level="0",fullname="/src/a.c",line="7"}"#);
        h.feed("(gdb) ");
        assert!(h.engine.is_idle());
        assert_eq!(h.markers.frame(), Some((Path::new("/src/a.c"), 7)));

        h.submit("step");
        assert_eq!(h.last_written(), r#"2-interpreter-exec console "step""#);
        assert!(!h.engine.is_idle());
        assert!(h.link.console.ends_with("step\n"));
    }

    #[test]
    fn test_stop_schedules_refresh() {
        let mut h = Harness::new(vec![OobCommand::StackFrame]);
        h.feed("(gdb) ");
        h.feed(r#"1^error,msg="No stack.""#);
        h.feed("(gdb) ");
        assert!(h.engine.is_idle());

        h.submit("continue");
        h.feed("2^running");
        h.feed("*running,thread-id=\"all\"");
        h.feed("(gdb) ");
        assert_eq!(h.last_written(), "3-stack-info-frame");
        h.feed(r#"3^error,msg="Selected thread is running.""#);
        h.feed("(gdb) ");
        assert!(h.engine.is_idle());

        h.feed(r#"*stopped,reason="breakpoint-hit",frame={fullname="/src/a.c",line="4"}"#);
        h.feed("(gdb) ");
        assert_eq!(h.last_written(), "4-stack-info-frame");
        h.feed(r#"4^done,frame={level="0",fullname="/src/a.c",line="4"}"#);
        h.feed("(gdb) ");
        assert_eq!(h.markers.frame(), Some((Path::new("/src/a.c"), 4)));
        assert_eq!(h.writer.len(), 4);
    }

    #[test]
    fn test_console_output_after_stop() {
        let mut h = Harness::new(vec![OobCommand::StackFrame]);
        h.feed("(gdb) ");
        h.feed(r#"1^error,msg="No stack.""#);
        h.feed("(gdb) ");
        assert!(h.engine.is_idle());
        let before = h.link.console.len();

        h.feed(r#"~"\nBreakpoint 1, main () at a.c:4\n""#);
        h.feed(r#"*stopped,reason="breakpoint-hit",frame={fullname="/src/a.c",line="4"}"#);
        h.feed("(gdb) ");
        assert_eq!(
            &h.link.console[before..],
            "\nBreakpoint 1, main () at a.c:4\n(gdb) "
        );
        assert_eq!(h.last_written(), "2-stack-info-frame");
    }

    #[test]
    fn test_stop_with_token_schedules_refresh() {
        let mut h = Harness::new(vec![OobCommand::StackFrame]);
        h.feed("(gdb) ");
        h.feed(r#"1^error,msg="No stack.""#);
        h.feed("(gdb) ");

        h.submit("continue");
        h.feed("2^running");
        h.feed("(gdb) ");
        h.feed(r#"3^error,msg="Selected thread is running.""#);
        h.feed("(gdb) ");
        assert!(h.engine.is_idle());

        h.feed(r#"2*stopped,reason="breakpoint-hit",frame={fullname="/src/a.c",line="4"}"#);
        h.feed("(gdb) ");
        assert_eq!(h.last_written(), "4-stack-info-frame");
        h.feed(r#"4^done,frame={level="0",fullname="/src/a.c",line="4"}"#);
        h.feed("(gdb) ");
        assert_eq!(h.markers.frame(), Some((Path::new("/src/a.c"), 4)));
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut h = Harness::new(vec![]);
        h.feed("(gdb) ");
        h.submit("p 1");
        h.feed("garbage from nowhere");
        h.feed(r#"~"$1 = 1\n""#);
        h.feed("2^done");
        h.feed("1^done");
        h.feed("(gdb) ");
        assert!(h.link.console.ends_with("$1 = 1\n(gdb) "));
        assert!(h.engine.pending().is_empty());
        assert!(h.engine.is_idle());

        // an error without stream output is still shown
        h.submit("frobnicate");
        h.feed(r#"2^error,msg="Undefined command: \"frobnicate\".""#);
        h.feed("(gdb) ");
        assert!(h
            .link
            .console
            .ends_with("frobnicate\nUndefined command: \"frobnicate\".\n(gdb) "));
    }

    #[test]
    fn test_dump() {
        let mut h = Harness::new(vec![]);
        h.submit("run");
        let dump = h.engine.dump();
        assert!(dump.contains("next token: 1"));
        assert!(dump.contains("deferred: run"));
    }
}
