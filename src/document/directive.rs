//! Block directives embedded in the document body.
//!
//! ```text
//! .. image:: http://example.com/photos/lake.jpg
//!    :rotate: 90
//!    :scale: 0.25
//!    :alt: The lake in January
//!    :uploaded-rot90: http://blog.example.org/wp-content/uploads/lake-rot90.jpg
//! ```
//!
//! A directive is a `.. <kind>:: <argument>` line followed by indented
//! `:option: value` lines. Options are checked against a per-kind allow-list;
//! unknown options are rejected instead of being carried along silently.
//! Directive lines inside fenced code blocks are left alone.

use crate::error::PressError;
use crate::pipeline::form::{TransformSpec, UPLOADED};
use crate::pipeline::orchestrator::ImageRequest;
use crate::pipeline::store::EntityKind;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*)\.\.\s+([A-Za-z][\w-]*)::(?:\s+(.*?))?\s*$").unwrap());
static RE_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s+):([A-Za-z_][\w.-]*):(?:\s+(.*?))?\s*$").unwrap());
static RE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(```|~~~)").unwrap());

/// Presentation options of an image directive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageAttrs {
    pub alt: Option<String>,
    pub title: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub align: Option<String>,
    pub class: Option<String>,
}

/// A parsed directive block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub kind: EntityKind,
    /// Source URI (image) or file path (upload).
    pub argument: String,
    /// Options in document order, names as written.
    pub options: Vec<(String, String)>,
    /// 1-indexed line of the `..` line in the source document.
    pub line: usize,
    pub indent: usize,
}

impl Directive {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn invalid(&self, detail: impl Into<String>) -> PressError {
        PressError::InvalidDirective {
            directive: self.kind.as_str().to_string(),
            line: self.line,
            detail: detail.into(),
        }
    }

    /// Check every option against the kind's allow-list.
    pub fn validate(&self) -> Result<(), PressError> {
        if self.argument.is_empty() {
            return Err(self.invalid("missing argument"));
        }
        for (name, value) in &self.options {
            let allowed = match self.kind {
                EntityKind::Image => is_image_option(name),
                EntityKind::Upload => matches!(name.as_str(), "uploaded" | "uploaded_form"),
            };
            if !allowed {
                return Err(self.invalid(format!("unknown option '{name}'")));
            }
            if is_record_option(self.kind, name) && value.is_empty() {
                return Err(self.invalid(format!("option '{name}' needs a location")));
            }
        }
        Ok(())
    }

    /// Record options carried in the text, keyed by canonical attribute key.
    ///
    /// `saved_as` (image) and `uploaded_form` (upload) are older spellings of
    /// `uploaded`.
    pub fn records(&self) -> Vec<(String, String)> {
        self.options
            .iter()
            .filter(|(name, _)| is_record_option(self.kind, name))
            .map(|(name, value)| {
                let key = match name.as_str() {
                    "saved_as" | "uploaded_form" => UPLOADED.to_string(),
                    other => other.to_string(),
                };
                (key, value.clone())
            })
            .collect()
    }

    /// Build the typed request of an image directive.
    pub fn image_request(&self) -> Result<ImageRequest, PressError> {
        if self.kind != EntityKind::Image {
            return Err(self.invalid("not an image directive"));
        }
        let mut transforms = TransformSpec::new();
        if let Some(deg) = self.option("rotate") {
            if deg.is_empty() {
                return Err(self.invalid("option 'rotate' needs a value"));
            }
            transforms = transforms.with_rotate(deg);
        }
        if let Some(scale) = self.option("scale") {
            if scale.is_empty() {
                return Err(self.invalid("option 'scale' needs a value"));
            }
            transforms = transforms.with_scale(scale);
        }
        Ok(ImageRequest {
            source_uri: self.argument.clone(),
            transforms,
            explicit_target: self
                .option("target")
                .filter(|t| !t.is_empty())
                .map(String::from),
        })
    }

    pub fn image_attrs(&self) -> ImageAttrs {
        let get = |name: &str| self.option(name).map(String::from);
        ImageAttrs {
            alt: get("alt"),
            title: get("title"),
            width: get("width"),
            height: get("height"),
            align: get("align"),
            class: get("class"),
        }
    }
}

fn is_image_option(name: &str) -> bool {
    matches!(
        name,
        "rotate"
            | "scale"
            | "target"
            | "alt"
            | "title"
            | "width"
            | "height"
            | "align"
            | "class"
            | "uploaded"
            | "saved_as"
    ) || name
        .strip_prefix("uploaded-")
        .is_some_and(|form| !form.is_empty())
}

fn is_record_option(kind: EntityKind, name: &str) -> bool {
    match kind {
        EntityKind::Image => {
            name == "uploaded" || name == "saved_as" || name.starts_with("uploaded-")
        }
        EntityKind::Upload => name == "uploaded" || name == "uploaded_form",
    }
}

/// A piece of the document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Markup passed to the Markdown renderer unchanged.
    Markup(String),
    Directive(Directive),
}

/// Split `lines` (starting at 0-indexed `first_line`) into markup and directives.
pub(crate) fn scan_blocks(lines: &[&str], first_line: usize) -> Result<Vec<Block>, PressError> {
    let mut blocks = Vec::new();
    let mut markup: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut i = first_line;

    while i < lines.len() {
        let line = lines[i];
        if RE_FENCE.is_match(line) {
            in_fence = !in_fence;
        }
        let caps = match RE_DIRECTIVE.captures(line) {
            Some(caps) if !in_fence => caps,
            _ => {
                markup.push(line);
                i += 1;
                continue;
            }
        };

        let indent = caps[1].len();
        let name = &caps[2];
        let kind = EntityKind::from_directive(name).ok_or_else(|| PressError::InvalidDirective {
            directive: name.to_string(),
            line: i + 1,
            detail: "unknown directive".to_string(),
        })?;
        let mut directive = Directive {
            kind,
            argument: caps.get(3).map(|m| m.as_str().to_string()).unwrap_or_default(),
            options: Vec::new(),
            line: i + 1,
            indent,
        };

        i += 1;
        while i < lines.len() {
            match RE_OPTION.captures(lines[i]) {
                Some(opt) if opt[1].len() > indent => {
                    let value = opt.get(3).map(|m| m.as_str().to_string()).unwrap_or_default();
                    directive.options.push((opt[2].to_string(), value));
                    i += 1;
                }
                _ => break,
            }
        }
        directive.validate()?;

        if !markup.is_empty() {
            blocks.push(Block::Markup(markup.join("\n")));
            markup.clear();
        }
        blocks.push(Block::Directive(directive));
    }

    if !markup.is_empty() {
        blocks.push(Block::Markup(markup.join("\n")));
    }
    Ok(blocks)
}

/// Write `:key: value` into every `kind` directive whose argument is `argument`.
///
/// Directive lines inside fenced code blocks are not touched, matching
/// [`scan_blocks`].
///
/// An existing option of the same name is updated in place; otherwise the
/// option is inserted right after the directive line, three columns deeper
/// than the directive.
pub(crate) fn replace_directive_option(
    text: &str,
    kind: EntityKind,
    argument: &str,
    key: &str,
    value: &str,
) -> String {
    let pattern = format!(
        r"^(\s*)\.\.\s+{}::\s+{}\s*$",
        regex::escape(kind.as_str()),
        regex::escape(argument)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return text.to_string();
    };

    let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
    let mut in_fence = false;
    let mut i = 0;
    while i < lines.len() {
        if RE_FENCE.is_match(&lines[i]) {
            in_fence = !in_fence;
        }
        let indent = match re.captures(&lines[i]) {
            Some(caps) if !in_fence => caps[1].len(),
            _ => {
                i += 1;
                continue;
            }
        };

        let mut j = i + 1;
        let mut existing = None;
        while j < lines.len() {
            match RE_OPTION.captures(&lines[j]) {
                Some(opt) if opt[1].len() > indent => {
                    if &opt[2] == key {
                        existing = Some((j, opt[1].to_string()));
                    }
                    j += 1;
                }
                _ => break,
            }
        }

        match existing {
            Some((line, pad)) => lines[line] = format!("{pad}:{key}: {value}"),
            None => {
                let pad = " ".repeat(indent + 3);
                lines.insert(i + 1, format!("{pad}:{key}: {value}"));
                j += 1;
            }
        }
        i = j;
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(text: &str) -> Result<Vec<Block>, PressError> {
        let lines: Vec<&str> = text.split('\n').collect();
        scan_blocks(&lines, 0)
    }

    fn only_directive(blocks: &[Block]) -> &Directive {
        blocks
            .iter()
            .find_map(|b| match b {
                Block::Directive(d) => Some(d),
                _ => None,
            })
            .expect("a directive")
    }

    #[test]
    fn scans_image_directive_with_options() {
        let text = "Intro\n\n.. image:: /tmp/foo.jpg\n   :uploaded: http://foo/on/you\n   :uploaded-rot90: http://foo-90/on/you\n\nOutro";
        let blocks = scan(text).unwrap();
        assert_eq!(blocks.len(), 3);
        let d = only_directive(&blocks);
        assert_eq!(d.kind, EntityKind::Image);
        assert_eq!(d.argument, "/tmp/foo.jpg");
        assert_eq!(d.line, 3);
        assert_eq!(
            d.records(),
            vec![
                ("uploaded".to_string(), "http://foo/on/you".to_string()),
                ("uploaded-rot90".to_string(), "http://foo-90/on/you".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_option_is_rejected() {
        let err = scan(".. image:: a.jpg\n   :form-big: x").unwrap_err();
        match err {
            PressError::InvalidDirective { line, detail, .. } => {
                assert_eq!(line, 1);
                assert!(detail.contains("form-big"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_directive_is_rejected() {
        assert!(scan(".. figure:: a.jpg").is_err());
    }

    #[test]
    fn bare_uploaded_prefix_is_rejected() {
        assert!(scan(".. image:: a.jpg\n   :uploaded-: http://x").is_err());
    }

    #[test]
    fn directives_inside_code_fences_are_markup() {
        let blocks = scan("```\n.. image:: a.jpg\n```").unwrap();
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], Block::Markup(_)));
    }

    #[test]
    fn saved_as_maps_to_uploaded() {
        let blocks = scan(".. image:: a.jpg\n   :saved_as: http://host/a.jpg").unwrap();
        assert_eq!(
            only_directive(&blocks).records(),
            vec![("uploaded".to_string(), "http://host/a.jpg".to_string())]
        );
    }

    #[test]
    fn image_request_orders_rotate_before_scale() {
        let blocks = scan(".. image:: a.jpg\n   :scale: 0.25\n   :rotate: 90\n   :target: http://x").unwrap();
        let req = only_directive(&blocks).image_request().unwrap();
        assert_eq!(req.transforms.rotate.as_deref(), Some("90"));
        assert_eq!(req.transforms.scale.as_deref(), Some("0.25"));
        assert_eq!(req.explicit_target.as_deref(), Some("http://x"));
    }

    #[test]
    fn upload_directive_accepts_legacy_option() {
        let blocks = scan(".. upload:: notes.odt\n   :uploaded_form: http://host/notes.odt").unwrap();
        let d = only_directive(&blocks);
        assert_eq!(d.kind, EntityKind::Upload);
        assert_eq!(d.records()[0].0, "uploaded");
    }

    #[test]
    fn option_inserted_after_directive_preserving_indent() {
        let text = "  .. image:: http://x/a.jpg\n     :scale: 0.5\n\nbody";
        let out = replace_directive_option(text, EntityKind::Image, "http://x/a.jpg", "uploaded", "http://h/a.jpg");
        assert_eq!(
            out,
            "  .. image:: http://x/a.jpg\n     :uploaded: http://h/a.jpg\n     :scale: 0.5\n\nbody"
        );
    }

    #[test]
    fn existing_option_is_updated_in_place() {
        let text = ".. image:: a.jpg\n   :uploaded: http://old\n";
        let out = replace_directive_option(text, EntityKind::Image, "a.jpg", "uploaded", "http://new");
        assert_eq!(out, ".. image:: a.jpg\n   :uploaded: http://new\n");
    }

    #[test]
    fn fenced_sample_is_not_rewritten() {
        let text = "```\n.. image:: a.jpg\n```\n\n.. image:: a.jpg\n";
        let out = replace_directive_option(text, EntityKind::Image, "a.jpg", "uploaded", "L");
        assert_eq!(out, "```\n.. image:: a.jpg\n```\n\n.. image:: a.jpg\n   :uploaded: L\n");
    }

    #[test]
    fn every_matching_directive_is_rewritten() {
        let text = ".. image:: a.jpg\n\ntext\n\n.. image:: a.jpg\n   :scale: 0.5";
        let out = replace_directive_option(text, EntityKind::Image, "a.jpg", "uploaded", "L");
        assert_eq!(out.matches(":uploaded: L").count(), 2);
    }
}
