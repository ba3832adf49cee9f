use crate::engine::oob::{DebugState, OobCommand};
use crate::engine::Context;
use crate::marker::message::quote;
use crate::mi::value::{ResultClass, ResultRecord};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// A request sent to the debugger.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Interactive command line typed by the user, run by the console interpreter.
    Cli(String),
    /// Housekeeping command of the out of band batch.
    Oob(OobCommand),
}

impl Command {
    /// Text written to the debugger for this command.
    pub fn format(&self, token: u64) -> String {
        match self {
            Command::Cli(line) => format!("{token}-interpreter-exec console {}", quote(line)),
            Command::Oob(cmd) => format!("{token}{}", cmd.mi()),
        }
    }

    pub fn is_cli(&self) -> bool {
        matches!(self, Command::Cli(_))
    }

    /// Handle the payload of the result record that carries the token of this command.
    /// `stream` is the output collected since the last prompt.
    pub(super) fn handle_result(
        &self,
        class: char,
        payload: &str,
        stream: &mut String,
        state: &mut DebugState,
        ctx: &mut Context,
    ) {
        if class != '^' {
            log::debug!(target: "mi", "out of band record for `{self}`: {class}{payload}");
            return;
        }

        let Some(record) = crate::weak_error!(payload.parse::<ResultRecord>(), "result record:")
        else {
            return;
        };
        match self {
            Command::Cli(_) => {
                if record.class == ResultClass::Error {
                    // the debugger usually echoes the error on its log stream already
                    let msg = record.message().unwrap_or("unknown error");
                    if !stream.contains(msg) {
                        stream.push_str(msg);
                        stream.push('\n');
                    }
                } else if record.class == ResultClass::Exit {
                    log::info!(target: "mi", "debugger is exiting");
                }
            }
            Command::Oob(cmd) => cmd.handle_result(&record, state, ctx),
        }
    }

    /// Handle the stream output collected until the prompt that follows the result.
    pub(super) fn handle_stream(&self, text: &str, ctx: &mut Context) {
        match self {
            Command::Cli(_) => {
                if !text.is_empty() {
                    ctx.link.console_print(text)
                }
            }
            Command::Oob(cmd) => {
                if !text.is_empty() {
                    log::debug!(target: "mi", "stream output of `{}` ignored: {text:?}", cmd.mi());
                }
            }
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Cli(line) => f.write_str(line),
            Command::Oob(cmd) => f.write_str(cmd.mi()),
        }
    }
}

/// Commands waiting for their result, keyed by token.
#[derive(Default)]
pub struct ResultTable {
    pending: BTreeMap<u64, Command>,
}

impl ResultTable {
    pub fn insert(&mut self, token: u64, command: Command) {
        self.pending.insert(token, command);
    }

    /// Remove and return the command owning `token`. A token is consumed only once.
    pub fn remove(&mut self, token: u64) -> Option<Command> {
        self.pending.remove(&token)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u64, &Command)> {
        self.pending.iter()
    }
}
