//! # pressmark
//!
//! Publish Markdown documents to a WordPress blog, uploading each image
//! form exactly once.
//!
//! A document starts with a field list (`:title:`, `:categories:`,
//! `:tags:` ...) followed by Markdown. Images and attachments are written
//! as directives:
//!
//! ```text
//! .. image:: http://example.com/lake.jpg
//!    :rotate: 90
//!    :scale: 0.25
//!    :alt: The lake in winter
//! ```
//!
//! Every transform chain has a form name (`rot90-scale0.25`). Once a form is
//! uploaded its URL is recorded (as a directive option such as
//! `:uploaded-rot90-scale0.25:`, in an INI side file, or both), so running
//! the tool again on the same document uploads nothing new.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Load     header fields + body blocks
//!  ├─ 2. Check    title, categories, tags against the host
//!  ├─ 3. Resolve  per directive: lookup, or fetch → rotate → scale → upload
//!  ├─ 4. Render   Markdown + directive HTML → post body
//!  └─ 5. Post     new post or edit, post id saved with the document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pressmark::{publish_sync, ConfigFile, ContentHost, WordPressClient};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = ConfigFile::load(&ConfigFile::default_path())?;
//!     let config = file.builder().build()?;
//!     let host = WordPressClient::connect(&file.account, config.download_timeout_secs)?;
//!     let output = publish_sync("post.md", &config, Some(&host as &dyn ContentHost))?;
//!     eprintln!("post {:?}: {} uploads", output.post_id, output.uploads);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pressmark` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pressmark = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod progress;
pub mod publish;
pub mod render;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AccountConfig, ConfigFile, PublishConfig, PublishConfigBuilder, StorageMode};
pub use document::{DocumentContext, FieldValue};
pub use error::{ImageError, PressError};
pub use host::{Category, ContentHost, HostError, Post, PostKind, Tag, WordPressClient};
pub use pipeline::form::{compute_form, TransformSpec};
pub use pipeline::orchestrator::{ImageRequest, RenderedImageRef, UploadedFile};
pub use pipeline::store::EntityKind;
pub use progress::{NoopProgressCallback, ProgressCallback, PublishProgressCallback};
pub use publish::{publish, publish_sync, PublishOutput, ResolvedImage};
