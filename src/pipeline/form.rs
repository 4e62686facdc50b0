//! Form naming: map a requested transform chain to its canonical form and
//! the attribute key its upload is recorded under.
//!
//! A form is the `-`-joined list of step suffixes in the fixed order
//! rotate → scale, e.g. `rot90-scale0.25`. The empty form is the source
//! image uploaded as-is and is recorded under `uploaded`; every other form
//! under `uploaded-<form>`.

/// Attribute key of the untransformed upload.
pub const UPLOADED: &str = "uploaded";

/// One transform step kind. Declaration order is application order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformKind {
    Rotate,
    Scale,
}

impl TransformKind {
    /// Prefix used in forms and staged filenames.
    pub fn prefix(self) -> &'static str {
        match self {
            TransformKind::Rotate => "rot",
            TransformKind::Scale => "scale",
        }
    }

    /// Directive option naming this step.
    pub fn option_name(self) -> &'static str {
        match self {
            TransformKind::Rotate => "rotate",
            TransformKind::Scale => "scale",
        }
    }

    /// Suffix for one step with its raw parameter, e.g. `rot90`.
    pub fn suffix(self, parameter: &str) -> String {
        format!("{}{}", self.prefix(), parameter)
    }
}

/// The requested transform chain of an image reference.
///
/// Holds at most one step per kind; parameters are kept as written in the
/// markup so that the form string round-trips through the document text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransformSpec {
    pub rotate: Option<String>,
    pub scale: Option<String>,
}

impl TransformSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rotate(mut self, degrees: impl Into<String>) -> Self {
        self.rotate = Some(degrees.into().trim().to_string());
        self
    }

    pub fn with_scale(mut self, spec: impl Into<String>) -> Self {
        self.scale = Some(spec.into().trim().to_string());
        self
    }

    /// Steps in canonical application order.
    pub fn steps(&self) -> impl Iterator<Item = (TransformKind, &str)> {
        [
            (TransformKind::Rotate, self.rotate.as_deref()),
            (TransformKind::Scale, self.scale.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, param)| param.map(|p| (kind, p)))
    }

    pub fn is_empty(&self) -> bool {
        self.rotate.is_none() && self.scale.is_none()
    }

    pub fn has_scale(&self) -> bool {
        self.scale.is_some()
    }

    /// The same chain without its scale step.
    pub fn without_scale(&self) -> Self {
        Self {
            rotate: self.rotate.clone(),
            scale: None,
        }
    }
}

/// Canonical form string of a transform chain; `""` when there are no steps.
pub fn compute_form(spec: &TransformSpec) -> String {
    spec.steps()
        .map(|(kind, param)| kind.suffix(param))
        .collect::<Vec<_>>()
        .join("-")
}

/// Attribute key a form's upload is recorded under.
pub fn attribute_key(form: &str) -> String {
    if form.is_empty() {
        UPLOADED.to_string()
    } else {
        format!("{UPLOADED}-{form}")
    }
}

/// Attribute key of the full-size (rotate-only) form a scaled image links to.
pub fn non_scaled_attribute_key(spec: &TransformSpec) -> String {
    attribute_key(&compute_form(&spec.without_scale()))
}
