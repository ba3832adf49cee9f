use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// Marker categories, each one is defined as an annotation type once per file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnoType {
    BpEnabled,
    BpDisabled,
    Frame,
}

impl AnnoType {
    fn name(self) -> &'static str {
        match self {
            AnnoType::BpEnabled => "bpEnabled",
            AnnoType::BpDisabled => "bpDisabled",
            AnnoType::Frame => "frame",
        }
    }

    fn glyph(self) -> &'static str {
        match self {
            AnnoType::BpEnabled | AnnoType::BpDisabled => "bp",
            AnnoType::Frame => "=>",
        }
    }

    fn color(self) -> u32 {
        match self {
            AnnoType::BpEnabled => 0x0c3def,
            AnnoType::BpDisabled => 0x3fef4b,
            AnnoType::Frame => 0xefb735,
        }
    }
}

/// A message of the outward editor protocol.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    EditFile(PathBuf),
    PutBufferNumber(PathBuf),
    StopDocumentListen,
    DefineAnnoType { type_num: u32, anno: AnnoType },
    AddAnno { serial: u32, type_num: u32, line: u32 },
    RemoveAnno { serial: u32 },
    SetDot { line: u32 },
}

impl Message {
    /// Protocol name of the message.
    pub fn name(&self) -> &'static str {
        match self {
            Message::EditFile(_) => "editFile",
            Message::PutBufferNumber(_) => "putBufferNumber",
            Message::StopDocumentListen => "stopDocumentListen",
            Message::DefineAnnoType { .. } => "defineAnnoType",
            Message::AddAnno { .. } => "addAnno",
            Message::RemoveAnno { .. } => "removeAnno",
            Message::SetDot { .. } => "setDot",
        }
    }

    /// Space separated message parameters, empty for messages without parameters.
    pub fn params(&self) -> String {
        match self {
            Message::EditFile(path) | Message::PutBufferNumber(path) => {
                quote(&path.to_string_lossy())
            }
            Message::StopDocumentListen => String::new(),
            Message::DefineAnnoType { type_num, anno } => format!(
                "{type_num} \"{}\" \"\" \"{}\" none {}",
                anno.name(),
                anno.glyph(),
                anno.color()
            ),
            Message::AddAnno {
                serial,
                type_num,
                line,
            } => format!("{serial} {type_num} {line}/0 -1"),
            Message::RemoveAnno { serial } => serial.to_string(),
            Message::SetDot { line } => format!("{line}/0"),
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let params = self.params();
        if params.is_empty() {
            f.write_str(self.name())
        } else {
            write!(f, "{} {params}", self.name())
        }
    }
}

/// Quote a string and escape the characters that are special inside a quoted string.
pub fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    for c in s.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            '\r' => quoted.push_str("\\r"),
            '\\' => quoted.push_str("\\\\"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
