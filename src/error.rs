//! Error types for the pressmark library.
//!
//! Two distinct error types reflect two distinct scopes:
//!
//! * [`PressError`] — **Fatal**: the document cannot be converted or
//!   published (missing title, malformed directive, host unreachable).
//!   Returned as `Err(PressError)` from the top-level `publish*` functions.
//!
//! * [`ImageError`] — a single image reference failed somewhere in the
//!   fetch → transform → upload chain. The pipeline stages return it; the
//!   document converter wraps it in [`PressError::Image`] together with the
//!   offending URI and form, because one bad image aborts the whole
//!   document (there is no partial publish).

use std::path::PathBuf;
use thiserror::Error;

use crate::host::HostError;

/// All fatal errors returned by the pressmark library.
#[derive(Debug, Error)]
pub enum PressError {
    // ── Image pipeline ────────────────────────────────────────────────────
    /// An image reference could not be resolved.
    #[error("Image '{uri}' (form '{form}'): {source}")]
    Image {
        uri: String,
        form: String,
        #[source]
        source: ImageError,
    },

    // ── Document errors ───────────────────────────────────────────────────
    /// A directive carried an option outside its allow-list, or lacked its argument.
    #[error("Invalid '{directive}' directive on line {line}: {detail}")]
    InvalidDirective {
        directive: String,
        line: usize,
        detail: String,
    },

    /// A required bibliographic field is missing or empty.
    #[error("Field '{field}' missing: {hint}")]
    MissingField { field: String, hint: String },

    /// A bibliographic field has a value the host cannot accept.
    #[error("Invalid field '{field}': {detail}")]
    InvalidField { field: String, detail: String },

    /// The post names a category the host does not know.
    #[error("Category '{name}' does not exist on the host.\nCreate it via the web interface first.")]
    UnknownCategory { name: String },

    // ── Host errors ───────────────────────────────────────────────────────
    /// The remote content host rejected a call.
    #[error("Content host error: {0}")]
    Host(#[from] HostError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read or write a local file.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or config-file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No config file existed; a template was written for the user to edit.
    #[error("Need configuration! Edit {path:?}")]
    ConfigMissing { path: PathBuf },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PressError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PressError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure while resolving one image reference.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The URI's last path segment has no extension to name the staged file after.
    #[error("'{uri}' has no filename extension; rename the source or save it locally first")]
    AmbiguousFilename { uri: String },

    /// Downloading or copying the source failed.
    #[error("Failed to fetch '{uri}': {reason}")]
    Fetch { uri: String, reason: String },

    /// The staged file is not a decodable raster image.
    #[error("Cannot decode image '{path}': {detail}")]
    ImageDecode { path: PathBuf, detail: String },

    /// `scale` is neither a positive factor nor a `WxH` pair.
    #[error("Invalid scale '{spec}': expected a factor like 0.25 or dimensions like 200x150")]
    InvalidScaleSpec { spec: String },

    /// `rotate` is not a finite number of degrees.
    #[error("Invalid rotation '{degrees}': expected degrees like 90 or -12.5")]
    InvalidRotation { degrees: String },

    /// The content host refused the upload.
    #[error("Upload of '{path}' failed (fault {code}): {message}")]
    Upload {
        path: PathBuf,
        code: i64,
        message: String,
    },

    /// No record exists under the requested key.
    #[error("No record '{key}' for {kind} '{uri}'")]
    NotFound {
        kind: String,
        uri: String,
        key: String,
    },

    /// Reading or writing a staged file or record file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ImageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImageError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_error_display_carries_context() {
        let e = PressError::Image {
            uri: "http://example.com/foo.jpg".into(),
            form: "rot90".into(),
            source: ImageError::InvalidScaleSpec {
                spec: "big".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("http://example.com/foo.jpg"), "got: {msg}");
        assert!(msg.contains("rot90"), "got: {msg}");
        assert!(msg.contains("big"), "got: {msg}");
    }

    #[test]
    fn upload_error_display_includes_fault_code() {
        let e = ImageError::Upload {
            path: PathBuf::from("/tmp/foo.jpg"),
            code: 500,
            message: "Could not write file".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("fault 500"), "got: {msg}");
        assert!(msg.contains("Could not write file"));
    }

    #[test]
    fn invalid_directive_display() {
        let e = PressError::InvalidDirective {
            directive: "image".into(),
            line: 12,
            detail: "unknown option 'form-big'".into(),
        };
        assert!(e.to_string().contains("line 12"));
        assert!(e.to_string().contains("form-big"));
    }
}
