//! Progress-callback trait for per-image publishing events.
//!
//! Inject an [`Arc<dyn PublishProgressCallback>`] via
//! [`crate::config::PublishConfigBuilder::progress_callback`] to receive
//! events as the image pipeline resolves each directive of a document.
//!
//! # Example
//!
//! ```rust
//! use pressmark::{PublishConfig, PublishProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct UploadCounter {
//!     uploads: AtomicUsize,
//! }
//!
//! impl PublishProgressCallback for UploadCounter {
//!     fn on_image_uploaded(&self, uri: &str, key: &str, location: &str) {
//!         self.uploads.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{uri} [{key}] → {location}");
//!     }
//! }
//!
//! let counter = Arc::new(UploadCounter { uploads: AtomicUsize::new(0) });
//! let config = PublishConfig::builder()
//!     .progress_callback(counter as Arc<dyn PublishProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the publisher as it works through a document's directives.
///
/// The trait is `Send + Sync` because the blocking pipeline runs on a
/// `spawn_blocking` thread while the caller lives on the async side. All
/// methods default to no-ops.
pub trait PublishProgressCallback: Send + Sync {
    /// Called once after the document was scanned.
    ///
    /// # Arguments
    /// * `total_directives` — image and upload directives to resolve
    fn on_document_start(&self, total_directives: usize) {
        let _ = total_directives;
    }

    /// Called before a directive is resolved.
    ///
    /// # Arguments
    /// * `index` — 1-indexed position among the document's directives
    /// * `uri`   — the directive's source URI or path
    fn on_directive_start(&self, index: usize, total: usize, uri: &str) {
        let _ = (index, total, uri);
    }

    /// Called when a record already existed and no work was needed.
    fn on_cache_hit(&self, uri: &str, key: &str) {
        let _ = (uri, key);
    }

    /// Called after each successful upload (or preview stand-in).
    fn on_image_uploaded(&self, uri: &str, key: &str, location: &str) {
        let _ = (uri, key, location);
    }

    /// Called when a directive fails; the run aborts afterwards.
    fn on_directive_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Called once after every directive resolved.
    ///
    /// # Arguments
    /// * `uploads` — uploads performed in this run (0 on a fully warm store)
    fn on_document_complete(&self, total_directives: usize, uploads: usize) {
        let _ = (total_directives, uploads);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PublishProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PublishConfig`].
pub type ProgressCallback = Arc<dyn PublishProgressCallback>;
