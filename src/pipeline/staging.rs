//! Local staging: where source images and their derived files live on disk.
//!
//! ## Persistent vs. temporary staging
//!
//! With `save_uploads` the staging directory is `uploads/` next to the
//! document and everything in it is kept, so a later run that only changes
//! the scale step finds the downloaded (and rotated) files already there.
//! Otherwise files go to a shared temp directory and every file the run
//! creates is registered with the run's [`CleanupList`], which deletes them
//! when the run ends, successful or not.

use crate::error::ImageError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Copies the bytes behind a URI into a local file.
pub trait Fetcher {
    fn fetch(&self, uri: &str, dest: &Path) -> Result<(), ImageError>;
}

/// Fetches `http(s)` URIs over the network and copies everything else from disk.
///
/// Relative paths resolve against `base_dir`, normally the document's directory.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    base_dir: PathBuf,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(base_dir: impl Into<PathBuf>, timeout_secs: u64) -> Result<Self, ImageError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("pressmark/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ImageError::Fetch {
                uri: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_dir: base_dir.into(),
            timeout_secs,
        })
    }

    fn local_source(&self, uri: &str) -> PathBuf {
        let raw = uri.strip_prefix("file://").unwrap_or(uri);
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, uri: &str, dest: &Path) -> Result<(), ImageError> {
        if !is_url(uri) {
            let src = self.local_source(uri);
            std::fs::copy(&src, dest).map_err(|e| ImageError::Fetch {
                uri: uri.to_string(),
                reason: format!("{}: {e}", src.display()),
            })?;
            debug!("Copied {} to {}", src.display(), dest.display());
            return Ok(());
        }

        info!("Downloading {}", uri);
        let fail = |reason: String| ImageError::Fetch {
            uri: uri.to_string(),
            reason,
        };
        let response = self.client.get(uri).send().map_err(|e| {
            if e.is_timeout() {
                fail(format!("timed out after {}s", self.timeout_secs))
            } else {
                fail(e.to_string())
            }
        })?;
        if !response.status().is_success() {
            return Err(fail(format!("HTTP {}", response.status())));
        }
        let bytes = response.bytes().map_err(|e| fail(e.to_string()))?;
        std::fs::write(dest, &bytes).map_err(|e| ImageError::io(dest, e))?;
        debug!("Downloaded {} bytes to {}", bytes.len(), dest.display());
        Ok(())
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Filename a source URI is staged under: its last path segment, query
/// stripped and percent-decoded.
///
/// A segment without an extension is refused rather than guessed at.
pub fn uri_filename(uri: &str) -> Result<String, ImageError> {
    let segment = match reqwest::Url::parse(uri) {
        Ok(url) if url.scheme().len() > 1 => url
            .path_segments()
            .and_then(|mut s| s.next_back())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .unwrap_or_default(),
        // Plain (or drive-letter) paths.
        _ => Path::new(uri)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let has_extension = Path::new(&segment)
        .extension()
        .is_some_and(|e| !e.is_empty());
    if segment.is_empty() || !has_extension {
        return Err(ImageError::AmbiguousFilename {
            uri: uri.to_string(),
        });
    }
    Ok(segment)
}

/// `dir/foo.jpg` + `rot90` → `dir/foo-rot90.jpg`.
pub fn derived_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{suffix}"),
    };
    path.with_file_name(name)
}

/// The directory one run stages its files in.
#[derive(Debug, Clone)]
pub struct StagingDir {
    dir: PathBuf,
    persistent: bool,
    document_dir: PathBuf,
}

impl StagingDir {
    /// `uploads/` next to the document when `persist`, else `temp_dir`.
    /// Both are created if missing.
    pub fn resolve(document_path: &Path, persist: bool, temp_dir: &Path) -> Result<Self, ImageError> {
        let document_dir = document_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let dir = if persist {
            document_dir.join("uploads")
        } else {
            temp_dir.to_path_buf()
        };
        std::fs::create_dir_all(&dir).map_err(|e| ImageError::io(&dir, e))?;
        debug!(
            "Staging in {} ({})",
            dir.display(),
            if persist { "persistent" } else { "temporary" }
        );
        Ok(Self {
            dir,
            persistent: persist,
            document_dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn document_dir(&self) -> &Path {
        &self.document_dir
    }

    /// A local file named in the document; relative paths are taken from
    /// the document's directory.
    pub fn source_path(&self, path: &str) -> PathBuf {
        let raw = path.strip_prefix("file://").unwrap_or(path);
        let p = Path::new(raw);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.document_dir.join(p)
        }
    }

    /// Where `uri` is staged.
    ///
    /// Only the last path segment is kept, so `http://a/x/pic.jpg` and
    /// `http://b/y/pic.jpg` map to the same file. Whichever is fetched first
    /// in a run is the one both resolve to.
    pub fn staged_path(&self, uri: &str) -> Result<PathBuf, ImageError> {
        Ok(self.dir.join(uri_filename(uri)?))
    }

    /// Stage `uri`, reusing an already staged copy.
    pub fn fetch(
        &self,
        fetcher: &dyn Fetcher,
        uri: &str,
        cleanup: &mut CleanupList,
    ) -> Result<PathBuf, ImageError> {
        let dest = self.staged_path(uri)?;
        if dest.exists() {
            debug!(
                "Already staged: {} (reused for {}; URIs sharing a file name share this copy)",
                dest.display(),
                uri
            );
        } else {
            fetcher.fetch(uri, &dest)?;
        }
        self.track(&dest, cleanup);
        Ok(dest)
    }

    /// Register a file this run produced for deletion unless staging persists.
    pub fn track(&self, path: &Path, cleanup: &mut CleanupList) {
        if !self.persistent {
            cleanup.register(path);
        }
    }
}

/// Files to delete when a run ends.
///
/// Owned by one run; [`cleanup_all`](Self::cleanup_all) runs at most once and
/// is also triggered on drop.
#[derive(Debug, Default)]
pub struct CleanupList {
    files: Vec<PathBuf>,
    done: bool,
}

impl CleanupList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, path: &Path) {
        if !self.files.iter().any(|f| f == path) {
            self.files.push(path.to_path_buf());
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Delete every registered file. Missing files are ignored.
    pub fn cleanup_all(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        for file in self.files.drain(..) {
            match std::fs::remove_file(&file) {
                Ok(()) => debug!("Removed {}", file.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {}", file.display(), e),
            }
        }
    }
}

impl Drop for CleanupList {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}
