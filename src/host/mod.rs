//! The remote content host.
//!
//! Everything the publisher needs from a blog is behind [`ContentHost`]:
//! file uploads, the tag and category taxonomy, and creating or editing a
//! post. [`xmlrpc::WordPressClient`] implements it against a WordPress
//! XML-RPC endpoint; tests substitute recording fakes.

pub mod xmlrpc;

pub use xmlrpc::WordPressClient;

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure talking to the content host.
#[derive(Debug, Error)]
pub enum HostError {
    /// The request never got a well-formed HTTP answer.
    #[error("{method}: {reason}")]
    Transport { method: String, reason: String },

    /// The host answered with an XML-RPC fault.
    #[error("fault {code}: {message}")]
    Fault { code: i64, message: String },

    /// The answer did not have the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A local file to be sent could not be read.
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A tag known to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub name: String,
    pub count: u64,
}

/// A category known to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub name: String,
    pub description: String,
}

/// Whether a document becomes a blog post or a static page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    #[default]
    Post,
    Page,
}

/// The content sent for one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Post {
    pub title: String,
    /// Rendered HTML body.
    pub body: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub kind: PostKind,
}

/// A blog that can receive files and posts.
///
/// `Send + Sync` so a host can be shared with the blocking publish thread.
pub trait ContentHost: Send + Sync {
    /// Upload a local file; returns its public URL.
    fn upload_file(&self, path: &Path, overwrite: bool) -> Result<String, HostError>;

    fn tags(&self) -> Result<Vec<Tag>, HostError>;

    fn categories(&self) -> Result<Vec<Category>, HostError>;

    /// Create a post (or page); returns the new id.
    fn new_post(&self, post: &Post, publish: bool) -> Result<String, HostError>;

    /// Replace the content of an existing post (or page).
    fn edit_post(&self, id: &str, post: &Post, publish: bool) -> Result<(), HostError>;
}
