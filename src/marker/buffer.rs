use crate::link::EditorLink;
use crate::marker::message::{AnnoType, Message};
use crate::marker::{AnnoKey, Serials};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};

/// One placed (or to be placed) marker.
#[derive(Clone, Debug)]
pub struct Annotation {
    pub line: u32,
    pub disabled: bool,
    /// Serial of the placed marker instance, the only handle the editor knows it by.
    pub serial: u32,
    /// True when an `addAnno` was emitted and not yet followed by a `removeAnno`.
    pub placed: bool,
}

/// Annotations of a single source file, the analogue of an editor buffer.
pub struct Buffer {
    path: PathBuf,
    id: u32,
    registered: bool,
    cursor: Option<(u32, u32)>,
    /// Last allocated annotation type number in this file.
    type_num: u32,
    /// Type of enabled breakpoints, disabled ones use `bp_tnum + 1`.
    bp_tnum: u32,
    frame_tnum: u32,
    annotations: IndexMap<AnnoKey, Annotation>,
}

impl Buffer {
    pub(super) fn new(path: PathBuf, id: u32) -> Self {
        Self {
            path,
            id,
            registered: false,
            cursor: None,
            type_num: 0,
            bp_tnum: 0,
            frame_tnum: 0,
            annotations: IndexMap::new(),
        }
    }

    /// Full path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stable file id, starts at one.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// True when the file was announced to the editor.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Last cursor position (line, column) set in this file.
    pub fn cursor(&self) -> Option<(u32, u32)> {
        self.cursor
    }

    pub fn annotations(&self) -> impl Iterator<Item = (&AnnoKey, &Annotation)> {
        self.annotations.iter()
    }

    pub(super) fn get(&self, key: &AnnoKey) -> Option<&Annotation> {
        self.annotations.get(key)
    }

    fn send(&self, link: &mut dyn EditorLink, message: Message) {
        link.send(self.id, &message);
    }

    fn register(&mut self, link: &mut dyn EditorLink) {
        if !self.registered {
            self.send(link, Message::EditFile(self.path.clone()));
            self.send(link, Message::PutBufferNumber(self.path.clone()));
            self.send(link, Message::StopDocumentListen);
            self.registered = true;
        }
    }

    fn define_frame_anno(&mut self, link: &mut dyn EditorLink) -> u32 {
        if self.frame_tnum == 0 {
            self.type_num += 1;
            self.frame_tnum = self.type_num;
            self.send(
                link,
                Message::DefineAnnoType {
                    type_num: self.frame_tnum,
                    anno: AnnoType::Frame,
                },
            );
        }
        self.frame_tnum
    }

    // both breakpoint types are defined in sequence
    fn define_bp_anno(&mut self, link: &mut dyn EditorLink) -> u32 {
        if self.bp_tnum == 0 {
            self.bp_tnum = self.type_num + 1;
            self.type_num += 2;
            self.send(
                link,
                Message::DefineAnnoType {
                    type_num: self.bp_tnum,
                    anno: AnnoType::BpEnabled,
                },
            );
            self.send(
                link,
                Message::DefineAnnoType {
                    type_num: self.bp_tnum + 1,
                    anno: AnnoType::BpDisabled,
                },
            );
        }
        self.bp_tnum
    }

    /// Insert a new annotation and place its marker. Return the placed line.
    pub(super) fn add(
        &mut self,
        key: AnnoKey,
        line: u32,
        serial: u32,
        link: &mut dyn EditorLink,
    ) -> Option<u32> {
        debug_assert!(!self.annotations.contains_key(&key));
        self.annotations.insert(
            key.clone(),
            Annotation {
                line,
                disabled: false,
                serial,
                placed: false,
            },
        );
        self.place(&key, link)
    }

    /// Emit the messages that place the marker of an annotation, if it is not placed yet.
    /// Return the placed line.
    fn place(&mut self, key: &AnnoKey, link: &mut dyn EditorLink) -> Option<u32> {
        self.register(link);

        let anno = self.annotations.get(key)?.clone();
        if anno.placed {
            return None;
        }

        let type_num = match key {
            AnnoKey::Frame => self.define_frame_anno(link),
            AnnoKey::Breakpoint(_) if anno.disabled => self.define_bp_anno(link) + 1,
            AnnoKey::Breakpoint(_) => self.define_bp_anno(link),
        };
        self.send(
            link,
            Message::AddAnno {
                serial: anno.serial,
                type_num,
                line: anno.line,
            },
        );
        self.cursor = Some((anno.line, 0));
        self.send(link, Message::SetDot { line: anno.line });

        if let Some(anno) = self.annotations.get_mut(key) {
            anno.placed = true;
        }
        Some(anno.line)
    }

    /// Remove the marker of an annotation from the editor, the annotation itself is kept.
    fn unplace(&mut self, key: &AnnoKey, link: &mut dyn EditorLink) {
        let registered = self.registered;
        let id = self.id;
        if let Some(anno) = self.annotations.get_mut(key) {
            if registered && anno.placed {
                link.send(
                    id,
                    &Message::RemoveAnno {
                        serial: anno.serial,
                    },
                );
            }
            anno.placed = false;
        }
    }

    /// Apply a new enabled/disabled state. A state change replaces the placed marker by a new
    /// one with a fresh serial. Return the placed line if a marker was placed.
    pub(super) fn set_disabled(
        &mut self,
        key: &AnnoKey,
        disabled: bool,
        serials: &mut Serials,
        link: &mut dyn EditorLink,
    ) -> Option<u32> {
        let current = self.annotations.get(key)?.disabled;
        if current != disabled {
            self.unplace(key, link);
            if let Some(anno) = self.annotations.get_mut(key) {
                anno.disabled = disabled;
                anno.serial = serials.alloc();
            }
        }
        self.place(key, link)
    }

    /// Remove an annotation and its marker.
    pub(super) fn remove(&mut self, key: &AnnoKey, link: &mut dyn EditorLink) -> Option<Annotation> {
        self.unplace(key, link);
        self.annotations.shift_remove(key)
    }

    /// Remove all annotations at `line` (all annotations when `line` is `None`).
    pub(super) fn remove_all(
        &mut self,
        line: Option<u32>,
        link: &mut dyn EditorLink,
    ) -> Vec<AnnoKey> {
        let keys: Vec<AnnoKey> = self
            .annotations
            .iter()
            .filter(|(_, anno)| line.map_or(true, |l| anno.line == l))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            self.remove(key, link);
        }
        keys
    }

    /// Lines of enabled breakpoints, a line may appear more than once.
    pub(super) fn enabled_breakpoint_lines(&self) -> Vec<u32> {
        self.annotations
            .iter()
            .filter(|(key, anno)| matches!(key, AnnoKey::Breakpoint(_)) && !anno.disabled)
            .map(|(_, anno)| anno.line)
            .collect()
    }
}
