//! Artifact store: which derivation of which source already lives where.
//!
//! Records are keyed by `(entity kind, source URI, attribute key)` and hold
//! the remote location of an upload. Depending on [`StorageMode`] they live
//! as directive options inside the document, in an INI side file whose
//! sections are named `"<kind> <uri>"`, or both. With both, reads prefer
//! the document.
//!
//! A write is flushed immediately (document saved, side file rewritten), so
//! a run that dies halfway through a document keeps every upload it made.

use crate::config::StorageMode;
use crate::document::DocumentContext;
use crate::error::{ImageError, PressError};
use crate::pipeline::ini::IniFile;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Kind of directive a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Image,
    Upload,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Image => "image",
            EntityKind::Upload => "upload",
        }
    }

    /// Map a directive name to its kind.
    pub fn from_directive(name: &str) -> Option<Self> {
        match name {
            "image" => Some(EntityKind::Image),
            "upload" => Some(EntityKind::Upload),
            _ => None,
        }
    }

    /// Side-file section holding the records of `uri`.
    pub fn section(self, uri: &str) -> String {
        format!("{} {}", self.as_str(), uri)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistent mapping from `(kind, uri, key)` to an uploaded location.
pub trait RecordStore {
    fn lookup(&self, kind: EntityKind, uri: &str, key: &str) -> Option<String>;

    /// Idempotent upsert, durable on return.
    fn set(
        &mut self,
        kind: EntityKind,
        uri: &str,
        key: &str,
        location: &str,
    ) -> Result<(), ImageError>;

    fn has(&self, kind: EntityKind, uri: &str, key: &str) -> bool {
        self.lookup(kind, uri, key).is_some()
    }

    fn get(&self, kind: EntityKind, uri: &str, key: &str) -> Result<String, ImageError> {
        self.lookup(kind, uri, key)
            .ok_or_else(|| ImageError::NotFound {
                kind: kind.to_string(),
                uri: uri.to_string(),
                key: key.to_string(),
            })
    }
}

/// The store used for real runs: document options and/or the side file.
pub struct ArtifactStore<'d> {
    mode: StorageMode,
    document: &'d mut DocumentContext,
    side_file: PathBuf,
    side: IniFile,
}

impl<'d> ArtifactStore<'d> {
    pub fn open(
        mode: StorageMode,
        document: &'d mut DocumentContext,
        side_file: impl Into<PathBuf>,
    ) -> Result<Self, ImageError> {
        let side_file = side_file.into();
        let side = if mode.uses_side_file() {
            IniFile::load(&side_file).map_err(|e| ImageError::io(&side_file, e))?
        } else {
            IniFile::new()
        };
        Ok(Self {
            mode,
            document,
            side_file,
            side,
        })
    }

    pub fn document(&self) -> &DocumentContext {
        self.document
    }
}

impl RecordStore for ArtifactStore<'_> {
    fn lookup(&self, kind: EntityKind, uri: &str, key: &str) -> Option<String> {
        if self.mode.uses_document() {
            if let Some(v) = self.document.record(kind, uri, key) {
                return Some(v.to_string());
            }
        }
        if self.mode.uses_side_file() {
            return self.side.get(&kind.section(uri), key).map(String::from);
        }
        None
    }

    fn set(
        &mut self,
        kind: EntityKind,
        uri: &str,
        key: &str,
        location: &str,
    ) -> Result<(), ImageError> {
        if self.mode.uses_document() {
            self.document.set_record(kind, uri, key, location);
            let path = self.document.path().map(Path::to_path_buf).unwrap_or_default();
            self.document.save().map_err(|e| ImageError::io(path, e))?;
        }
        if self.mode.uses_side_file() {
            // Re-read so records written since open() are kept.
            let mut side =
                IniFile::load(&self.side_file).map_err(|e| ImageError::io(&self.side_file, e))?;
            side.set(&kind.section(uri), key, location);
            side.save(&self.side_file)
                .map_err(|e| ImageError::io(&self.side_file, e))?;
            self.side = side;
        }
        debug!("Recorded {kind} {uri} [{key}] = {location}");
        Ok(())
    }
}

/// In-memory store; nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<(EntityKind, String, String), String>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without counting it as a write.
    pub fn with(mut self, kind: EntityKind, uri: &str, key: &str, location: &str) -> Self {
        self.records
            .insert((kind, uri.to_string(), key.to_string()), location.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl RecordStore for MemoryStore {
    fn lookup(&self, kind: EntityKind, uri: &str, key: &str) -> Option<String> {
        self.records
            .get(&(kind, uri.to_string(), key.to_string()))
            .cloned()
    }

    fn set(
        &mut self,
        kind: EntityKind,
        uri: &str,
        key: &str,
        location: &str,
    ) -> Result<(), ImageError> {
        self.records
            .insert((kind, uri.to_string(), key.to_string()), location.to_string());
        self.writes += 1;
        Ok(())
    }
}

// ── Post info ────────────────────────────────────────────────────────────

/// Post id and title, stored alongside the artifact records.
///
/// In the document they are header fields; in the side file they live in a
/// `"post <document path>"` section of the posts file.
pub struct PostInfo<'d> {
    mode: StorageMode,
    document: &'d mut DocumentContext,
    posts_file: PathBuf,
    section: String,
}

impl<'d> PostInfo<'d> {
    pub fn new(
        mode: StorageMode,
        document: &'d mut DocumentContext,
        posts_file: impl Into<PathBuf>,
    ) -> Self {
        let section = format!(
            "post {}",
            document
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        );
        Self {
            mode,
            document,
            posts_file: posts_file.into(),
            section,
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, PressError> {
        if self.mode.uses_document() {
            if let Some(v) = self.document.field_text(key) {
                return Ok(Some(v.to_string()));
            }
        }
        if self.mode.uses_side_file() {
            let ini = IniFile::load(&self.posts_file)
                .map_err(|e| PressError::io(&self.posts_file, e))?;
            return Ok(ini.get(&self.section, key).map(String::from));
        }
        Ok(None)
    }

    /// Store `key = value` and flush right away.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PressError> {
        if self.mode.uses_document() {
            self.document.set_field(key, value);
            let path = self.document.path().map(Path::to_path_buf).unwrap_or_default();
            self.document.save().map_err(|e| PressError::io(path, e))?;
        }
        if self.mode.uses_side_file() {
            let mut ini = IniFile::load(&self.posts_file)
                .map_err(|e| PressError::io(&self.posts_file, e))?;
            ini.set(&self.section, key, value);
            ini.save(&self.posts_file)
                .map_err(|e| PressError::io(&self.posts_file, e))?;
        }
        debug!("Saved post info {key} = {value}");
        Ok(())
    }
}
