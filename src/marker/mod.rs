//! Editor markers: breakpoints and the current frame indicator.
//!
//! Every file referenced by an annotation gets a [`Buffer`] with a stable file id. Files are
//! never forgotten during a session, so ids are never reused. Placing, moving or re-styling a
//! marker is always expressed as a removal followed by an addition, the editor addresses a
//! placed marker only by its serial number.

pub mod buffer;
pub mod message;

use crate::error::Error;
use crate::link::EditorLink;
use buffer::Buffer;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Key of an annotation in the global annotation namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AnnoKey {
    /// Breakpoint annotation, keyed by the debugger breakpoint number.
    Breakpoint(String),
    /// The single current frame annotation.
    Frame,
}

impl Display for AnnoKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnoKey::Breakpoint(id) => f.write_str(id),
            AnnoKey::Frame => f.write_str("frame"),
        }
    }
}

/// Generator of marker serial numbers.
#[derive(Default)]
pub struct Serials(u32);

impl Serials {
    pub fn alloc(&mut self) -> u32 {
        self.0 += 1;
        self.0
    }
}

/// Insert-only registry of files, indexed by path and by file id.
#[derive(Default)]
struct BufferRegistry {
    by_path: HashMap<PathBuf, u32>,
    buffers: Vec<Buffer>,
}

impl BufferRegistry {
    fn get_or_create(&mut self, path: &Path) -> &mut Buffer {
        let id = match self.by_path.get(path) {
            Some(id) => *id,
            None => {
                // file ids start at one
                let id = self.buffers.len() as u32 + 1;
                log::debug!(target: "buf", "new file {path:?} with id {id}");
                self.buffers.push(Buffer::new(path.to_path_buf(), id));
                self.by_path.insert(path.to_path_buf(), id);
                id
            }
        };
        &mut self.buffers[id as usize - 1]
    }

    fn get(&self, id: u32) -> Option<&Buffer> {
        self.buffers.get((id as usize).checked_sub(1)?)
    }

    fn get_mut(&mut self, id: u32) -> Option<&mut Buffer> {
        self.buffers.get_mut((id as usize).checked_sub(1)?)
    }

    fn find(&self, path: &Path) -> Option<&Buffer> {
        self.by_path.get(path).and_then(|id| self.get(*id))
    }
}

/// Read-only view of a breakpoint annotation.
#[derive(Debug, PartialEq)]
pub struct BreakpointView<'a> {
    pub path: &'a Path,
    pub line: u32,
    pub disabled: bool,
}

fn check_line(line: i64) -> Result<u32, Error> {
    match u32::try_from(line) {
        Ok(line) if line > 0 => Ok(line),
        _ => Err(Error::InvalidLine(line)),
    }
}

fn check_path(path: &Path) -> Result<(), Error> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(Error::RelativePath(path.to_path_buf()))
    }
}

/// Registry of all files and annotations known to the editor.
#[derive(Default)]
pub struct MarkerStore {
    registry: BufferRegistry,
    annotations: HashMap<AnnoKey, u32>,
    serials: Serials,
    focus: Option<u32>,
}

impl MarkerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(
        &mut self,
        key: AnnoKey,
        path: &Path,
        line: u32,
        link: &mut dyn EditorLink,
    ) -> Result<(), Error> {
        if self.annotations.contains_key(&key) {
            return Err(Error::DuplicateAnnotation(key.to_string()));
        }
        check_path(path)?;

        let serial = self.serials.alloc();
        let buffer = self.registry.get_or_create(path);
        let file_id = buffer.id();
        self.annotations.insert(key.clone(), file_id);
        if buffer.add(key, line, serial, link).is_some() {
            self.focus = Some(file_id);
        }
        Ok(())
    }

    fn remove(&mut self, key: &AnnoKey, link: &mut dyn EditorLink) -> Result<(), Error> {
        let file_id = self
            .annotations
            .remove(key)
            .ok_or_else(|| Error::UnknownAnnotation(key.to_string()))?;
        if let Some(buffer) = self.registry.get_mut(file_id) {
            buffer.remove(key, link);
        }
        Ok(())
    }

    /// Add a breakpoint annotation at `line` of file `path` and place its marker.
    ///
    /// # Errors
    ///
    /// Fails without any side effect if `line` is not strictly positive, if `id` already exists
    /// or if `path` is not absolute.
    pub fn add_annotation(
        &mut self,
        id: &str,
        path: &Path,
        line: i64,
        link: &mut dyn EditorLink,
    ) -> Result<(), Error> {
        let line = check_line(line)?;
        self.add(AnnoKey::Breakpoint(id.to_string()), path, line, link)
    }

    /// Set the enabled/disabled state of a breakpoint annotation.
    pub fn update_annotation(
        &mut self,
        id: &str,
        disabled: bool,
        link: &mut dyn EditorLink,
    ) -> Result<(), Error> {
        let key = AnnoKey::Breakpoint(id.to_string());
        let file_id = *self
            .annotations
            .get(&key)
            .ok_or_else(|| Error::UnknownAnnotation(id.to_string()))?;
        let Some(buffer) = self.registry.get_mut(file_id) else {
            return Err(Error::UnknownAnnotation(id.to_string()));
        };
        if buffer
            .set_disabled(&key, disabled, &mut self.serials, link)
            .is_some()
        {
            self.focus = Some(file_id);
        }
        Ok(())
    }

    /// Remove a breakpoint annotation and its marker.
    pub fn delete_annotation(&mut self, id: &str, link: &mut dyn EditorLink) -> Result<(), Error> {
        self.remove(&AnnoKey::Breakpoint(id.to_string()), link)
    }

    /// Show the frame annotation at `line` of `path`, the previous frame annotation (if any) is
    /// removed first. With no path only the removal happens.
    pub fn show_frame(
        &mut self,
        path: Option<&Path>,
        line: i64,
        link: &mut dyn EditorLink,
    ) -> Result<(), Error> {
        let line = check_line(line)?;
        if let Some(path) = path {
            check_path(path)?;
        }

        if self.annotations.contains_key(&AnnoKey::Frame) {
            self.remove(&AnnoKey::Frame, link)?;
        }
        match path {
            Some(path) => self.add(AnnoKey::Frame, path, line, link),
            None => Ok(()),
        }
    }

    /// Remove the frame annotation if there is one.
    pub fn hide_frame(&mut self, link: &mut dyn EditorLink) {
        if self.annotations.contains_key(&AnnoKey::Frame) {
            crate::muted_error!(self.remove(&AnnoKey::Frame, link));
        }
    }

    /// Remove all annotations of file `path` at `line` (all lines when `None`). Without a path
    /// every annotation of every file is removed and `line` is ignored. Return keys of removed
    /// annotations.
    pub fn delete_all(
        &mut self,
        path: Option<&Path>,
        line: Option<i64>,
        link: &mut dyn EditorLink,
    ) -> Result<Vec<AnnoKey>, Error> {
        let line = match path {
            Some(path) => {
                check_path(path)?;
                line.map(check_line).transpose()?
            }
            None => None,
        };

        let mut deleted = vec![];
        for buffer in self.registry.buffers.iter_mut() {
            if path.map_or(true, |p| p == buffer.path()) {
                let removed = buffer.remove_all(line, link);
                for key in &removed {
                    self.annotations.remove(key);
                }
                deleted.extend(removed);
            }
        }
        Ok(deleted)
    }

    /// Remove every annotation, errors are logged and ignored.
    pub fn teardown(&mut self, link: &mut dyn EditorLink) {
        if let Some(deleted) = crate::weak_error!(self.delete_all(None, None, link), "teardown:") {
            log::debug!(target: "buf", "teardown removed {} annotations", deleted.len());
        }
    }

    /// Lines of all enabled breakpoints in `path`, duplicates are kept.
    pub fn enabled_breakpoint_lines(&self, path: &Path) -> Vec<u32> {
        self.registry
            .find(path)
            .map(Buffer::enabled_breakpoint_lines)
            .unwrap_or_default()
    }

    /// Return file id of `path` if the file was ever referenced.
    pub fn file_id(&self, path: &Path) -> Option<u32> {
        self.registry.by_path.get(path).copied()
    }

    /// Return the file with id `file_id`.
    pub fn buffer(&self, file_id: u32) -> Option<&Buffer> {
        self.registry.get(file_id)
    }

    /// All known files in order of first reference.
    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.registry.buffers.iter()
    }

    fn lookup(&self, key: &AnnoKey) -> Option<(&Buffer, &buffer::Annotation)> {
        let buffer = self.registry.get(*self.annotations.get(key)?)?;
        Some((buffer, buffer.get(key)?))
    }

    /// Return the breakpoint annotation with `id`.
    pub fn breakpoint(&self, id: &str) -> Option<BreakpointView<'_>> {
        self.lookup(&AnnoKey::Breakpoint(id.to_string()))
            .map(|(buffer, anno)| BreakpointView {
                path: buffer.path(),
                line: anno.line,
                disabled: anno.disabled,
            })
    }

    /// Ids of all breakpoint annotations.
    pub fn breakpoint_ids(&self) -> Vec<String> {
        self.annotations
            .keys()
            .filter_map(|key| match key {
                AnnoKey::Breakpoint(id) => Some(id.clone()),
                AnnoKey::Frame => None,
            })
            .collect()
    }

    /// Location of the frame annotation.
    pub fn frame(&self) -> Option<(&Path, u32)> {
        self.lookup(&AnnoKey::Frame)
            .map(|(buffer, anno)| (buffer.path(), anno.line))
    }

    /// File that holds the editor cursor after the last marker placement.
    pub fn focus(&self) -> Option<&Buffer> {
        self.focus.and_then(|id| self.registry.get(id))
    }

    /// Human readable state, for diagnostics.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for buffer in self.buffers() {
            out.push_str(&format!(
                "{}: {}{}\n",
                buffer.id(),
                buffer.path().display(),
                if buffer.is_registered() { "" } else { " (unregistered)" }
            ));
            for (key, anno) in buffer.annotations() {
                out.push_str(&format!(
                    "  {key}: line {}, serial {}{}{}\n",
                    anno.line,
                    anno.serial,
                    if anno.disabled { ", disabled" } else { "" },
                    if anno.placed { "" } else { ", not placed" },
                ));
            }
        }
        out
    }
}
