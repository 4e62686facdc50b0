//! Bibliographic header fields.
//!
//! A document opens with a field list, one `:name: value` per line. A field
//! with an empty value may be followed by an indented bullet list, which
//! makes it a list field:
//!
//! ```text
//! :title: Rotating holiday photos
//! :categories: Photos, Travel
//! :tags:
//!    - winter
//!    - lake
//! ```
//!
//! The header ends at the first blank line or the first line that is
//! neither a field nor a bullet item.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static RE_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:([A-Za-z][\w-]*):(?:\s+(.*))?\s*$").unwrap());
static RE_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s+[-*+]\s+(.+?)\s*$").unwrap());

/// Value of a header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Empty,
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Scalar view; `None` for lists and empty fields.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// List view; a text value is split on commas.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            FieldValue::Empty => Vec::new(),
            FieldValue::Text(s) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            FieldValue::List(items) => items.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
        }
    }
}

/// One parsed field with the line range it occupies.
#[derive(Debug, Clone)]
pub(crate) struct HeaderField {
    pub name: String,
    pub value: FieldValue,
    /// First line (0-indexed) of the field.
    pub start: usize,
    /// One past the last line (bullet items included).
    pub end: usize,
}

/// Parsed header of a document.
#[derive(Debug, Clone, Default)]
pub(crate) struct Header {
    pub fields: Vec<HeaderField>,
    /// First line (0-indexed) of the header; leading blank lines are skipped.
    pub start: usize,
    /// Index of the first line after the header.
    pub end: usize,
}

impl Header {
    pub fn into_map(self) -> BTreeMap<String, FieldValue> {
        self.fields.into_iter().map(|f| (f.name, f.value)).collect()
    }
}

/// Parse the header of `lines`.
pub(crate) fn parse_header(lines: &[&str]) -> Header {
    let start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());
    let mut fields: Vec<HeaderField> = Vec::new();
    let mut i = start;

    while i < lines.len() {
        let line = lines[i];
        if let Some(caps) = RE_FIELD.captures(line) {
            let value = caps
                .get(2)
                .map(|m| m.as_str().trim())
                .filter(|v| !v.is_empty())
                .map(|v| FieldValue::Text(v.to_string()))
                .unwrap_or(FieldValue::Empty);
            fields.push(HeaderField {
                name: caps[1].to_string(),
                value,
                start: i,
                end: i + 1,
            });
        } else if let (Some(caps), Some(last)) = (RE_ITEM.captures(line), fields.last_mut()) {
            let item = caps[1].to_string();
            let value = &mut last.value;
            match value {
                // A bullet after a scalar value is body text, not header.
                FieldValue::Text(_) => break,
                FieldValue::List(items) => items.push(item),
                FieldValue::Empty => *value = FieldValue::List(vec![item]),
            }
            last.end = i + 1;
        } else {
            break;
        }
        i += 1;
    }

    if fields.is_empty() {
        return Header {
            fields,
            start: 0,
            end: 0,
        };
    }
    Header {
        fields,
        start,
        end: i,
    }
}

/// Set `name` to `value` in the header of `text`.
///
/// An existing field (with any bullet items) is replaced by a single line;
/// otherwise the field is appended to the header. A document without a
/// header gains one, separated from the body by a blank line.
pub(crate) fn replace_field(text: &str, name: &str, value: &str) -> String {
    let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
    let borrowed: Vec<&str> = lines.iter().map(String::as_str).collect();
    let header = parse_header(&borrowed);
    let new_line = format!(":{name}: {value}");

    if let Some(field) = header.fields.iter().find(|f| f.name == name) {
        lines.splice(field.start..field.end, std::iter::once(new_line));
    } else if header.fields.is_empty() {
        lines.splice(0..0, [new_line, String::new()]);
    } else {
        lines.insert(header.end, new_line);
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_of(text: &str) -> Header {
        let lines: Vec<&str> = text.split('\n').collect();
        parse_header(&lines)
    }

    #[test]
    fn parses_scalar_and_list_fields() {
        let text = ":title: Hello\n:tags:\n   - one\n   - two\n:categories: A, B\n\nBody";
        let header = header_of(text);
        assert_eq!(header.end, 5);
        let map = header.into_map();
        assert_eq!(map["title"], FieldValue::Text("Hello".into()));
        assert_eq!(map["tags"].as_list(), vec!["one", "two"]);
        assert_eq!(map["categories"].as_list(), vec!["A", "B"]);
    }

    #[test]
    fn empty_field_value() {
        let map = header_of(":title:\n\nbody").into_map();
        assert_eq!(map["title"], FieldValue::Empty);
        assert!(map["title"].is_empty());
    }

    #[test]
    fn no_header() {
        let header = header_of("# Heading\n\ntext");
        assert!(header.fields.is_empty());
        assert_eq!(header.end, 0);
    }

    #[test]
    fn leading_blank_lines_are_skipped() {
        let header = header_of("\n:title: Hello\n\nbody");
        assert_eq!(header.start, 1);
        assert_eq!(header.end, 2);
    }

    #[test]
    fn replace_existing_field() {
        let text = ":title: Old\n:id: 3\n\nbody";
        assert_eq!(replace_field(text, "title", "New"), ":title: New\n:id: 3\n\nbody");
    }

    #[test]
    fn replace_list_field_collapses_items() {
        let text = ":tags:\n   - a\n   - b\n:title: T\n\nbody";
        assert_eq!(
            replace_field(text, "tags", "a, b"),
            ":tags: a, b\n:title: T\n\nbody"
        );
    }

    #[test]
    fn append_missing_field_at_header_end() {
        let text = ":title: Hello\n\nbody";
        assert_eq!(replace_field(text, "id", "42"), ":title: Hello\n:id: 42\n\nbody");
    }

    #[test]
    fn add_header_when_absent() {
        assert_eq!(replace_field("body", "id", "7"), ":id: 7\n\nbody");
    }
}
