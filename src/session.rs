//! Glue between the editor, the protocol engine and the subordinate debugger.

use crate::channel::reaper::Termination;
use crate::channel::{Interrupt, SessionChannel};
use crate::engine::{CommandWriter, Context, Engine};
use crate::error::Error;
use crate::event::Hooks;
use crate::link::EditorLink;
use crate::marker::MarkerStore;
use crate::mi::PROMPT;
use crate::table::CommandTable;
use crate::weak_error;

/// Shown when an interrupt is requested and the debugger has no controlling terminal.
const NO_INTERRUPT: &str = "\nThe debugger runs on pipes and cannot be interrupted with a \
control character.\nGet the pid of the debuggee with the gdb command \"info proc\", then send \
it a SIGINT from a shell: \"kill -s INT <pid>\".\n";

/// Separator printed on the console when the session ends.
const CLOSE_BANNER: &str = "\n===========\n";

/// Bridge local commands, handled without the debugger.
const CMD_SIGINT: &str = "sigint";
const CMD_DUMP: &str = "dumprepr";

/// What a session needs from the subordinate process.
pub trait Subordinate: CommandWriter {
    fn interrupt(&mut self) -> Result<Interrupt, Error>;
}

impl Subordinate for SessionChannel {
    fn interrupt(&mut self) -> Result<Interrupt, Error> {
        SessionChannel::interrupt(self)
    }
}

pub struct Session<L: EditorLink> {
    engine: Engine,
    markers: MarkerStore,
    link: L,
    table: CommandTable,
}

impl<L: EditorLink> Session<L> {
    pub fn new(engine: Engine, table: CommandTable, link: L) -> Self {
        Self {
            engine,
            markers: MarkerStore::new(),
            link,
            table,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Process a line written by the debugger.
    pub fn handle_line<S: Subordinate>(&mut self, line: &str, sub: &mut S) -> Result<(), Error> {
        if line.is_empty() {
            return Ok(());
        }
        let mut ctx = Context {
            markers: &mut self.markers,
            link: &mut self.link,
        };
        self.engine.on_line(line, sub, &mut ctx)
    }

    /// Process a command line typed by the user.
    pub fn dispatch<S: Subordinate>(&mut self, line: &str, sub: &mut S) -> Result<(), Error> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        log::debug!(target: "bridge", "user command: {line}");

        match line {
            CMD_SIGINT => {
                if sub.interrupt()? == Interrupt::Degraded {
                    self.link.console_print(NO_INTERRUPT);
                    self.link.console_print(PROMPT);
                }
            }
            CMD_DUMP => {
                let dump = format!("{}{}", self.engine.dump(), self.markers.dump());
                self.link.console_print(&dump);
                self.link.console_print(PROMPT);
            }
            _ => match self.table.check(line).message() {
                Some(rejection) => {
                    log::info!(target: "bridge", "rejected: {line}");
                    self.link.console_print(rejection);
                    self.link.console_print(PROMPT);
                }
                None => self.engine.submit_interactive(line, sub, &mut self.link)?,
            },
        }
        Ok(())
    }

    /// End the session: ask the debugger to quit, reap it and remove all markers.
    pub fn close(&mut self, channel: &mut SessionChannel) -> Option<Termination> {
        if channel.is_open() && channel.termination().is_none() {
            _ = weak_error!(channel.interrupt(), "close:");
            _ = weak_error!(channel.write_line("quit"), "close:");
        }
        self.link.console_print(CLOSE_BANNER);
        let termination = channel.close();
        self.markers.teardown(&mut self.link);
        termination
    }
}

impl<L: EditorLink> Hooks for Session<L> {
    fn on_line(&mut self, line: &str, channel: &mut SessionChannel) -> Result<(), Error> {
        self.handle_line(line, channel)
    }

    fn on_editor_line(&mut self, line: &str, channel: &mut SessionChannel) -> Result<(), Error> {
        self.dispatch(line, channel)
    }

    fn on_process_exit(&mut self, termination: &Termination) {
        log::info!(target: "bridge", "debugger terminated: {termination}");
        self.link.console_print(&format!("\n{termination}\n"));
        self.markers.teardown(&mut self.link);
    }
}
