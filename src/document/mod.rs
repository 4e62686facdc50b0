//! The source document and its typed side-channel.
//!
//! [`DocumentContext`] owns the document text for the duration of a run.
//! The publisher reads bibliographic fields through it and writes derived
//! state back through it: artifact records become directive options, post
//! info becomes header fields. Every write goes to the in-memory text first;
//! [`DocumentContext::save`] flushes it to disk when something changed.

pub mod directive;
pub mod fields;

pub use directive::{Block, Directive, ImageAttrs};
pub use fields::FieldValue;

use crate::error::PressError;
use crate::pipeline::store::EntityKind;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

type RecordMap = BTreeMap<(EntityKind, String), BTreeMap<String, String>>;

/// A loaded document plus everything the publisher learned about it.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    path: Option<PathBuf>,
    text: String,
    on_disk: String,
    fields: BTreeMap<String, FieldValue>,
    records: RecordMap,
    read_only: bool,
}

impl DocumentContext {
    /// Read the document at `path`.
    pub fn load(path: &Path) -> Result<Self, PressError> {
        let text = std::fs::read_to_string(path).map_err(|e| PressError::io(path, e))?;
        let mut doc = Self::from_text(text);
        doc.path = Some(path.to_path_buf());
        debug!("Loaded document {} ({} fields)", path.display(), doc.fields.len());
        Ok(doc)
    }

    /// A document without a backing file; [`save`](Self::save) is a no-op.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let lines: Vec<&str> = text.split('\n').collect();
        let fields = fields::parse_header(&lines).into_map();
        Self {
            path: None,
            on_disk: text.clone(),
            text,
            fields,
            records: RecordMap::new(),
            read_only: false,
        }
    }

    /// Keep every change in memory only.
    pub fn read_only(mut self, v: bool) -> Self {
        self.read_only = v;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the in-memory text differs from the file.
    pub fn is_dirty(&self) -> bool {
        self.text != self.on_disk
    }

    // ── Header fields ────────────────────────────────────────────────────

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Scalar value of a non-empty text field.
    pub fn field_text(&self, name: &str) -> Option<&str> {
        self.field(name)
            .and_then(FieldValue::as_text)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Set a header field, rewriting the header line in the text.
    pub fn set_field(&mut self, name: &str, value: &str) {
        self.text = fields::replace_field(&self.text, name, value);
        self.fields
            .insert(name.to_string(), FieldValue::Text(value.to_string()));
    }

    // ── Directive records ────────────────────────────────────────────────

    /// Record option `key` of the `kind` directive for `uri`, as found in the text.
    pub fn record(&self, kind: EntityKind, uri: &str, key: &str) -> Option<&str> {
        self.records
            .get(&(kind, uri.to_string()))
            .and_then(|r| r.get(key))
            .map(String::as_str)
    }

    fn note_record(&mut self, kind: EntityKind, uri: &str, key: String, value: String) {
        self.records
            .entry((kind, uri.to_string()))
            .or_default()
            .insert(key, value);
    }

    /// Upsert a record and mirror it as a directive option in the text.
    pub fn set_record(&mut self, kind: EntityKind, uri: &str, key: &str, value: &str) {
        self.text = directive::replace_directive_option(&self.text, kind, uri, key, value);
        self.note_record(kind, uri, key.to_string(), value.to_string());
    }

    // ── Body ─────────────────────────────────────────────────────────────

    /// Split the body (everything after the header) into markup and directives.
    ///
    /// Records carried by directive options become visible through
    /// [`record`](Self::record).
    pub fn scan(&mut self) -> Result<Vec<Block>, PressError> {
        let lines: Vec<&str> = self.text.split('\n').collect();
        let header = fields::parse_header(&lines);
        let blocks = directive::scan_blocks(&lines, header.end)?;

        let mut found = Vec::new();
        for block in &blocks {
            if let Block::Directive(d) = block {
                for (key, value) in d.records() {
                    found.push((d.kind, d.argument.clone(), key, value));
                }
            }
        }
        for (kind, uri, key, value) in found {
            self.note_record(kind, &uri, key, value);
        }
        Ok(blocks)
    }

    /// Write the text back if it changed. Returns whether a write happened.
    pub fn save(&mut self) -> std::io::Result<bool> {
        let Some(path) = self.path.as_ref() else {
            return Ok(false);
        };
        if self.read_only || !self.is_dirty() {
            return Ok(false);
        }
        std::fs::write(path, &self.text)?;
        self.on_disk = self.text.clone();
        debug!("Saved {}", path.display());
        Ok(true)
    }
}
