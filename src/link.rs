//! Outward side of the bridge: the editor.
//!
//! The editor transport is assumed to be reliable and line oriented, this module only decides how
//! marker messages and console text are laid out on it.

use crate::marker::message::Message;
use std::io::Write;

/// Sink for everything the bridge shows to the editor.
pub trait EditorLink {
    /// Send a marker message addressed to the file with `file_id`.
    fn send(&mut self, file_id: u32, message: &Message);

    /// Show text of the debugger console (stream output, prompts, rejections).
    fn console_print(&mut self, text: &str);
}

/// Writes netbeans-like lines: `<file-id>:<message>!<seqno> <params>`.
pub struct NetbeansLink<W: Write, C: Write> {
    out: W,
    console: C,
    seqno: u64,
}

impl<W: Write, C: Write> NetbeansLink<W, C> {
    pub fn new(out: W, console: C) -> Self {
        Self {
            out,
            console,
            seqno: 0,
        }
    }

    fn format(&mut self, file_id: u32, message: &Message) -> String {
        self.seqno += 1;
        let params = message.params();
        if params.is_empty() {
            format!("{file_id}:{}!{}", message.name(), self.seqno)
        } else {
            format!("{file_id}:{}!{} {params}", message.name(), self.seqno)
        }
    }
}

impl NetbeansLink<std::io::Stdout, std::io::Stderr> {
    /// Link over the process standard streams, markers on stdout and console text on stderr.
    pub fn stdio() -> Self {
        Self::new(std::io::stdout(), std::io::stderr())
    }
}

impl<W: Write, C: Write> EditorLink for NetbeansLink<W, C> {
    fn send(&mut self, file_id: u32, message: &Message) {
        let line = self.format(file_id, message);
        log::debug!(target: "bridge", "-> {line}");
        if let Err(e) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            log::error!(target: "bridge", "editor link write: {e:#}");
        }
    }

    fn console_print(&mut self, text: &str) {
        if let Err(e) = self
            .console
            .write_all(text.as_bytes())
            .and_then(|_| self.console.flush())
        {
            log::error!(target: "bridge", "console write: {e:#}");
        }
    }
}

/// Keeps everything sent to the editor in memory, in the order it was sent.
#[derive(Default)]
pub struct Recorder {
    pub messages: Vec<(u32, Message)>,
    pub console: String,
}

impl Recorder {
    /// Return and forget all recorded marker messages.
    pub fn take_messages(&mut self) -> Vec<(u32, Message)> {
        std::mem::take(&mut self.messages)
    }

    /// Return recorded message names, handy for ordering assertions.
    pub fn names(&self) -> Vec<&'static str> {
        self.messages.iter().map(|(_, m)| m.name()).collect()
    }
}

impl EditorLink for Recorder {
    fn send(&mut self, file_id: u32, message: &Message) {
        self.messages.push((file_id, message.clone()));
    }

    fn console_print(&mut self, text: &str) {
        self.console.push_str(text);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_netbeans_line_format() {
        let mut out = vec![];
        let mut console = vec![];
        {
            let mut link = NetbeansLink::new(&mut out, &mut console);
            link.send(1, &Message::EditFile(PathBuf::from("/src/a.c")));
            link.send(1, &Message::StopDocumentListen);
            link.send(2, &Message::SetDot { line: 3 });
            link.console_print("(gdb) ");
        }

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "1:editFile!1 \"/src/a.c\"\n1:stopDocumentListen!2\n2:setDot!3 3/0\n"
        );
        assert_eq!(String::from_utf8(console).unwrap(), "(gdb) ");
    }
}
