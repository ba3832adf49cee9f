//! Legal and illegal commands of the debugger.
//!
//! Some debugger commands break the machine interface session (they prompt on the terminal,
//! change the output layout or start an editor). They are rejected by prefix: the smallest
//! prefix of the illegal word that cannot complete to any other command.

use crate::error::Error;
use crate::version::run_batch;
use itertools::Itertools;

pub const ILLEGAL_COMMANDS: &[&str] = &[
    "-", "+", "<", ">", "complete", "define", "edit", "end", "shell",
];

pub const ILLEGAL_SET_ARGS: &[&str] = &["annotate", "confirm", "height", "width"];

/// Outcome of checking a user command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Legal,
    IllegalCommand,
    IllegalArgument,
}

impl Verdict {
    /// Message shown to the user on rejection.
    pub fn message(&self) -> Option<&'static str> {
        match self {
            Verdict::Legal => None,
            Verdict::IllegalCommand => Some("Illegal command.\n"),
            Verdict::IllegalArgument => Some("Illegal argument.\n"),
        }
    }
}

/// Return the smallest prefix of `word` that is not a prefix of `other`, empty if `word`
/// itself is a prefix of `other`.
pub fn smallest_prefix<'a>(word: &'a str, other: &str) -> &'a str {
    if other.starts_with(word) {
        return "";
    }
    let common = word
        .chars()
        .zip(other.chars())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .sum::<usize>();
    let next = word[common..].chars().next().map_or(0, char::len_utf8);
    &word[..common + next]
}

/// Return the smallest prefix of `word` that does not complete to a neighbour of `word` in
/// the sorted `list`. Return `word` itself when it is a prefix of a neighbour.
pub fn smallpref_inlist<'a>(word: &'a str, list: &[String]) -> &'a str {
    let mut sorted = list
        .iter()
        .map(String::as_str)
        .filter(|w| *w != word)
        .collect::<Vec<_>>();
    sorted.sort_unstable();
    let idx = sorted.partition_point(|w| *w < word);

    let previous = idx
        .checked_sub(1)
        .map(|i| smallest_prefix(word, sorted[i]));
    let next = sorted.get(idx).map(|w| smallest_prefix(word, w));

    [previous, next]
        .into_iter()
        .flatten()
        .map(|p| if p.is_empty() { word } else { p })
        .max_by_key(|p| p.len())
        .unwrap_or(word)
}

/// Command names known to the debugger and the prefixes that reject a user command line.
#[derive(Debug, Default)]
pub struct CommandTable {
    commands: Vec<String>,
    set_args: Vec<String>,
    illegal_cmds: Vec<String>,
    illegal_set_args: Vec<String>,
}

impl CommandTable {
    pub fn new(commands: Vec<String>, set_args: Vec<String>) -> Self {
        let commands = commands
            .into_iter()
            .filter(|c| !ILLEGAL_COMMANDS.contains(&c.as_str()))
            .sorted()
            .dedup()
            .collect::<Vec<_>>();
        let set_args = set_args
            .into_iter()
            .filter(|a| !ILLEGAL_SET_ARGS.contains(&a.as_str()))
            .sorted()
            .dedup()
            .collect::<Vec<_>>();

        let illegal_cmds = ILLEGAL_COMMANDS
            .iter()
            .map(|w| smallpref_inlist(w, &commands).to_string())
            .unique()
            .collect();
        let illegal_set_args = ILLEGAL_SET_ARGS
            .iter()
            .map(|w| smallpref_inlist(w, &set_args).to_string())
            .unique()
            .collect();

        Self {
            commands,
            set_args,
            illegal_cmds,
            illegal_set_args,
        }
    }

    /// Build the table from the completion lists of the debugger.
    pub fn introspect(pgm: &str) -> Result<Self, Error> {
        let commands = run_batch(pgm, &["complete"])?
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        let set_args = run_batch(pgm, &["complete set "])?
            .lines()
            .filter_map(|l| {
                let mut words = l.split_whitespace();
                match (words.next(), words.next(), words.next()) {
                    (Some("set"), Some(arg), None) => Some(arg.to_string()),
                    _ => {
                        log::warn!(target: "bridge", "invalid completion returned by gdb: {l}");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            target: "bridge",
            "{} gdb commands, {} set arguments",
            commands.len(),
            set_args.len()
        );
        Ok(Self::new(commands, set_args))
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn set_args(&self) -> &[String] {
        &self.set_args
    }

    pub fn illegal_prefixes(&self) -> (&[String], &[String]) {
        (&self.illegal_cmds, &self.illegal_set_args)
    }

    /// Check a user command line against the illegal prefixes.
    pub fn check(&self, line: &str) -> Verdict {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            return Verdict::Legal;
        };

        if self.illegal_cmds.iter().any(|p| cmd.starts_with(p.as_str())) {
            return Verdict::IllegalCommand;
        }
        if cmd == "set" {
            if let Some(arg) = words.next() {
                if self.illegal_set_args.iter().any(|p| arg.starts_with(p.as_str())) {
                    return Verdict::IllegalArgument;
                }
            }
        }
        Verdict::Legal
    }
}
