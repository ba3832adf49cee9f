//! Housekeeping commands run between two prompts of the user.

use crate::engine::Context;
use crate::mi::value::{ResultClass, ResultRecord, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

/// What the out of band batch learned about the debuggee.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DebugState {
    /// Location of the selected frame.
    pub frame: Option<(PathBuf, u32)>,
    /// Current source file and line.
    pub source: Option<(PathBuf, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobCommand {
    /// Synchronise breakpoint markers.
    BreakList,
    /// Follow the selected frame with the frame marker.
    StackFrame,
    /// Remember the current source file.
    SourceFile,
}

impl OobCommand {
    /// Commands run after each interactive command, in this order.
    pub const BATCH: [OobCommand; 3] = [
        OobCommand::BreakList,
        OobCommand::StackFrame,
        OobCommand::SourceFile,
    ];

    pub fn mi(&self) -> &'static str {
        match self {
            OobCommand::BreakList => "-break-list",
            OobCommand::StackFrame => "-stack-info-frame",
            OobCommand::SourceFile => "-file-list-exec-source-file",
        }
    }

    pub(super) fn handle_result(
        &self,
        record: &ResultRecord,
        state: &mut DebugState,
        ctx: &mut Context,
    ) {
        match (self, record.class) {
            (OobCommand::BreakList, ResultClass::Done) => sync_breakpoints(record, ctx),
            (OobCommand::StackFrame, ResultClass::Done) => {
                let frame = record.get("frame").and_then(location);
                if frame != state.frame {
                    match &frame {
                        Some((path, line)) => {
                            crate::weak_error!(
                                ctx.markers.show_frame(Some(path.as_path()), *line as i64, ctx.link),
                                "frame marker:"
                            );
                        }
                        None => ctx.markers.hide_frame(ctx.link),
                    }
                    state.frame = frame;
                }
            }
            (OobCommand::StackFrame, ResultClass::Error) => {
                // no stack: the debuggee is not running
                ctx.markers.hide_frame(ctx.link);
                state.frame = None;
            }
            (OobCommand::SourceFile, ResultClass::Done) => {
                state.source = fields_location(record.get_str("fullname"), record.get_str("line"));
            }
            (OobCommand::SourceFile, ResultClass::Error) => state.source = None,
            (cmd, class) => {
                log::warn!(target: "mi", "unexpected `{class}` result for `{}`", cmd.mi());
            }
        }
    }
}

fn fields_location(fullname: Option<&str>, line: Option<&str>) -> Option<(PathBuf, u32)> {
    let line = line?.parse::<u32>().ok()?;
    Some((PathBuf::from(fullname?), line))
}

fn location(tuple: &Value) -> Option<(PathBuf, u32)> {
    fields_location(tuple.get_str("fullname"), tuple.get_str("line"))
}

struct BreakpointInfo {
    id: String,
    path: PathBuf,
    line: u32,
    enabled: bool,
}

/// Flatten the breakpoint table, a breakpoint with several locations gives one entry per
/// location. Entries without a source location (watchpoints, catchpoints) are skipped.
fn breakpoint_table(record: &ResultRecord) -> Vec<BreakpointInfo> {
    let body = record
        .get("BreakpointTable")
        .and_then(|table| table.get("body"))
        .and_then(Value::as_list)
        .unwrap_or_default();

    let mut entries = vec![];
    for bkpt in body {
        let enabled = bkpt.get_str("enabled") != Some("n");
        let locations = bkpt
            .get("locations")
            .and_then(Value::as_list)
            .map(|l| l.iter().collect::<Vec<_>>())
            .unwrap_or_else(|| vec![bkpt]);

        for loc in locations {
            let (Some(id), Some((path, line))) = (loc.get_str("number"), location(loc)) else {
                continue;
            };
            entries.push(BreakpointInfo {
                id: id.to_string(),
                path,
                line,
                enabled: enabled && loc.get_str("enabled") != Some("n"),
            });
        }
    }
    entries
}

fn sync_breakpoints(record: &ResultRecord, ctx: &mut Context) {
    let table = breakpoint_table(record);
    let wanted: HashSet<&str> = table.iter().map(|bp| bp.id.as_str()).collect();

    let mut vanished = ctx.markers.breakpoint_ids();
    vanished.retain(|id| !wanted.contains(id.as_str()));
    vanished.sort();
    for id in vanished {
        crate::weak_error!(ctx.markers.delete_annotation(&id, ctx.link), "breakpoint sync:");
    }

    for bp in table {
        let current = ctx
            .markers
            .breakpoint(&bp.id)
            .map(|c| (c.path == bp.path.as_path() && c.line == bp.line, c.disabled));
        match current {
            Some((true, disabled)) => {
                if disabled == bp.enabled {
                    crate::weak_error!(
                        ctx.markers.update_annotation(&bp.id, !bp.enabled, ctx.link),
                        "breakpoint sync:"
                    );
                }
                continue;
            }
            Some((false, _)) => {
                crate::weak_error!(
                    ctx.markers.delete_annotation(&bp.id, ctx.link),
                    "breakpoint sync:"
                );
            }
            None => {}
        }

        let added = crate::weak_error!(
            ctx.markers
                .add_annotation(&bp.id, &bp.path, bp.line as i64, ctx.link),
            "breakpoint sync:"
        );
        if added.is_some() && !bp.enabled {
            crate::weak_error!(
                ctx.markers.update_annotation(&bp.id, true, ctx.link),
                "breakpoint sync:"
            );
        }
    }
}

/// Explicit cursor over the commands of one batch, advanced once per idle prompt.
#[derive(Debug)]
pub struct OobCursor {
    commands: Vec<OobCommand>,
    pos: usize,
    started: Instant,
}

impl OobCursor {
    pub fn new(commands: Vec<OobCommand>) -> Self {
        Self {
            commands,
            pos: 0,
            started: Instant::now(),
        }
    }

    /// Return the next command of the batch, `None` when the batch is exhausted.
    pub fn advance(&mut self) -> Option<OobCommand> {
        let cmd = self.commands.get(self.pos).copied();
        if cmd.is_some() {
            self.pos += 1;
        }
        cmd
    }

    /// Number of commands already handed out.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}
