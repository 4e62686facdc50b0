//! Upload gateway: push a staged file to the host and record where it went.
//!
//! [`upload_and_record`] is the only code path that creates artifact
//! records. In preview mode nothing leaves the machine: the staged file's
//! absolute path stands in for the remote location and the store is left
//! untouched.

use crate::error::ImageError;
use crate::host::{ContentHost, HostError};
use crate::pipeline::store::{EntityKind, RecordStore};
use std::path::Path;
use tracing::{debug, info};

/// Turns a local file into a location a rendered page can point at.
pub trait Uploader {
    fn upload(&self, path: &Path) -> Result<String, ImageError>;

    /// Preview uploaders produce local stand-ins that must not be recorded.
    fn is_preview(&self) -> bool {
        false
    }
}

/// [`Uploader`] backed by a [`ContentHost`], or a local stand-in for previews.
pub struct UploadGateway<'h> {
    host: Option<&'h dyn ContentHost>,
    overwrite: bool,
}

impl<'h> UploadGateway<'h> {
    pub fn new(host: &'h dyn ContentHost) -> Self {
        Self {
            host: Some(host),
            overwrite: false,
        }
    }

    /// A gateway that never contacts a host.
    pub fn preview() -> Self {
        Self {
            host: None,
            overwrite: false,
        }
    }

    /// Ask the host to replace an existing file of the same name.
    pub fn overwrite(mut self, v: bool) -> Self {
        self.overwrite = v;
        self
    }
}

impl Uploader for UploadGateway<'_> {
    fn upload(&self, path: &Path) -> Result<String, ImageError> {
        let Some(host) = self.host else {
            let absolute = std::fs::canonicalize(path).map_err(|e| ImageError::io(path, e))?;
            debug!("Preview: not uploading {}", absolute.display());
            return Ok(absolute.display().to_string());
        };

        let location = host.upload_file(path, self.overwrite).map_err(|e| {
            let (code, message) = match e {
                HostError::Fault { code, message } => (code, message),
                other => (0, other.to_string()),
            };
            ImageError::Upload {
                path: path.to_path_buf(),
                code,
                message,
            }
        })?;
        info!("Uploaded {} → {}", path.display(), location);
        Ok(location)
    }

    fn is_preview(&self) -> bool {
        self.host.is_none()
    }
}

/// Upload `path` and record the result under `(kind, uri, key)`.
pub fn upload_and_record(
    uploader: &dyn Uploader,
    store: &mut dyn RecordStore,
    kind: EntityKind,
    uri: &str,
    key: &str,
    path: &Path,
) -> Result<String, ImageError> {
    let location = uploader.upload(path)?;
    if !uploader.is_preview() {
        store.set(kind, uri, key, &location)?;
    }
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Category, Post, Tag};
    use crate::pipeline::store::MemoryStore;

    struct FaultyHost;

    impl ContentHost for FaultyHost {
        fn upload_file(&self, _path: &Path, _overwrite: bool) -> Result<String, HostError> {
            Err(HostError::Fault {
                code: 500,
                message: "Could not write file".into(),
            })
        }
        fn tags(&self) -> Result<Vec<Tag>, HostError> {
            Ok(Vec::new())
        }
        fn categories(&self) -> Result<Vec<Category>, HostError> {
            Ok(Vec::new())
        }
        fn new_post(&self, _post: &Post, _publish: bool) -> Result<String, HostError> {
            Ok("1".into())
        }
        fn edit_post(&self, _id: &str, _post: &Post, _publish: bool) -> Result<(), HostError> {
            Ok(())
        }
    }

    #[test]
    fn preview_uses_absolute_path_and_skips_store() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"x").unwrap();

        let mut store = MemoryStore::new();
        let gateway = UploadGateway::preview();
        let location =
            upload_and_record(&gateway, &mut store, EntityKind::Image, "a.png", "uploaded", &file)
                .unwrap();
        assert!(Path::new(&location).is_absolute());
        assert!(location.ends_with("a.png"));
        assert!(store.is_empty());
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn host_fault_carries_code() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"x").unwrap();

        let host = FaultyHost;
        let mut store = MemoryStore::new();
        let err = upload_and_record(
            &UploadGateway::new(&host),
            &mut store,
            EntityKind::Image,
            "a.png",
            "uploaded",
            &file,
        )
        .unwrap_err();
        match err {
            ImageError::Upload { code, message, .. } => {
                assert_eq!(code, 500);
                assert_eq!(message, "Could not write file");
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(store.is_empty());
    }
}
