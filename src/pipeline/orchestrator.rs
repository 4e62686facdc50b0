//! Image pipeline orchestrator.
//!
//! Drives one image reference through form naming, the store lookup and, on
//! a miss, fetch → rotate → scale → upload.
//!
//! ## What gets uploaded
//!
//! The final output of a chain is always uploaded. An intermediate output
//! (the untransformed original, or the rotated-but-not-scaled image) is
//! uploaded only when something points at it: it is the link target of a
//! scaled image, or another directive in the same document requests that
//! exact form. An intermediate whose record already exists is reused, not
//! uploaded again. Everything else stays a local staging file.
//!
//! ## Link targets
//!
//! An explicit `target` option always wins. Otherwise a scaled image links
//! to the same chain without its scale step, so clicking a thumbnail opens
//! the full-size (still rotated) picture. On a cache hit that link comes
//! from the record alone; a scaled image whose full-size form was never
//! recorded is shown without a link.

use crate::error::ImageError;
use crate::pipeline::form::{
    attribute_key, compute_form, non_scaled_attribute_key, TransformKind, TransformSpec, UPLOADED,
};
use crate::pipeline::staging::{CleanupList, Fetcher, StagingDir};
use crate::pipeline::store::{EntityKind, RecordStore};
use crate::pipeline::transform::Transformer;
use crate::pipeline::upload::{upload_and_record, Uploader};
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One image reference as found in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub source_uri: String,
    pub transforms: TransformSpec,
    /// Overrides the rendered hyperlink.
    pub explicit_target: Option<String>,
}

impl ImageRequest {
    pub fn new(source_uri: impl Into<String>) -> Self {
        Self {
            source_uri: source_uri.into(),
            transforms: TransformSpec::new(),
            explicit_target: None,
        }
    }

    pub fn with_transforms(mut self, transforms: TransformSpec) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.explicit_target = Some(target.into());
        self
    }

    pub fn form(&self) -> String {
        compute_form(&self.transforms)
    }

    pub fn key(&self) -> String {
        attribute_key(&self.form())
    }
}

/// Where a processed image is shown and what it links to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedImageRef {
    pub display_location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
}

/// A resolved `upload` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub location: String,
    pub name: String,
    pub mime: String,
    /// Size of the local file, when it is still around.
    pub size: Option<u64>,
}

/// Resolves the image and upload references of one document.
pub struct ImagePipeline<'a> {
    fetcher: &'a dyn Fetcher,
    transformer: &'a dyn Transformer,
    uploader: &'a dyn Uploader,
    store: &'a mut dyn RecordStore,
    staging: &'a StagingDir,
    cleanup: &'a mut CleanupList,
    /// `(uri, key)` pairs some directive of the document asks for.
    requested: HashSet<(String, String)>,
    /// Locations produced by this run; the only record of previews.
    produced: HashMap<(EntityKind, String, String), String>,
    progress: Option<ProgressCallback>,
    uploads: usize,
}

impl<'a> ImagePipeline<'a> {
    pub fn new(
        fetcher: &'a dyn Fetcher,
        transformer: &'a dyn Transformer,
        uploader: &'a dyn Uploader,
        store: &'a mut dyn RecordStore,
        staging: &'a StagingDir,
        cleanup: &'a mut CleanupList,
    ) -> Self {
        Self {
            fetcher,
            transformer,
            uploader,
            store,
            staging,
            cleanup,
            requested: HashSet::new(),
            produced: HashMap::new(),
            progress: None,
            uploads: 0,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Note that some directive wants `request`'s form, so producing it as an
    /// intermediate of another chain must upload it.
    pub fn request_form(&mut self, request: &ImageRequest) {
        self.requested
            .insert((request.source_uri.clone(), request.key()));
    }

    /// Uploads performed so far.
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    fn lookup(&self, kind: EntityKind, uri: &str, key: &str) -> Option<String> {
        self.produced
            .get(&(kind, uri.to_string(), key.to_string()))
            .cloned()
            .or_else(|| self.store.lookup(kind, uri, key))
    }

    /// Resolve one image reference.
    pub fn process(&mut self, request: &ImageRequest) -> Result<RenderedImageRef, ImageError> {
        let uri = request.source_uri.as_str();
        let key = request.key();

        if let Some(location) = self.lookup(EntityKind::Image, uri, &key) {
            debug!("Cache hit: {} [{}]", uri, key);
            if let Some(cb) = &self.progress {
                cb.on_cache_hit(uri, &key);
            }
            let link_target = match &request.explicit_target {
                Some(target) => Some(target.clone()),
                None if request.transforms.has_scale() => self.full_size_location(request),
                None => None,
            };
            return Ok(RenderedImageRef {
                display_location: location,
                link_target,
            });
        }

        self.derive(request, &key)
    }

    /// Recorded location of the non-scaled form of a cached scaled image.
    ///
    /// A hit never fetches or uploads, so without a record there is no link.
    fn full_size_location(&self, request: &ImageRequest) -> Option<String> {
        let key = non_scaled_attribute_key(&request.transforms);
        let location = self.lookup(EntityKind::Image, &request.source_uri, &key);
        if location.is_none() {
            debug!("No {} record for {}; image is not linked", key, request.source_uri);
        }
        location
    }

    fn derive(&mut self, request: &ImageRequest, key: &str) -> Result<RenderedImageRef, ImageError> {
        let uri = request.source_uri.as_str();
        info!("Deriving {} [{}]", uri, key);

        let link_key = match request.explicit_target {
            None if request.transforms.has_scale() => {
                Some(non_scaled_attribute_key(&request.transforms))
            }
            _ => None,
        };
        let mut link_target = request.explicit_target.clone();

        let mut path = self.staging.fetch(self.fetcher, uri, self.cleanup)?;
        let mut done = TransformSpec::new();
        let steps: Vec<(TransformKind, String)> = request
            .transforms
            .steps()
            .map(|(kind, param)| (kind, param.to_string()))
            .collect();

        for (kind, param) in steps {
            let stage_key = attribute_key(&compute_form(&done));
            if let Some(location) = self.settle_intermediate(uri, &stage_key, &path, &link_key)? {
                link_target = Some(location);
            }

            path = match kind {
                TransformKind::Rotate => self.transformer.rotate(&path, &param)?,
                TransformKind::Scale => self.transformer.scale(&path, &param)?,
            };
            self.staging.track(&path, self.cleanup);
            done = match kind {
                TransformKind::Rotate => done.with_rotate(param),
                TransformKind::Scale => done.with_scale(param),
            };
        }

        let display_location = self.upload(EntityKind::Image, uri, key, path)?;
        Ok(RenderedImageRef {
            display_location,
            link_target,
        })
    }

    /// Upload (or reuse) an intermediate stage if anything points at it.
    /// Returns its location when it is the link target.
    fn settle_intermediate(
        &mut self,
        uri: &str,
        stage_key: &str,
        path: &Path,
        link_key: &Option<String>,
    ) -> Result<Option<String>, ImageError> {
        let is_link = link_key.as_deref() == Some(stage_key);
        let requested = self
            .requested
            .contains(&(uri.to_string(), stage_key.to_string()));
        if !is_link && !requested {
            return Ok(None);
        }

        let location = match self.lookup(EntityKind::Image, uri, stage_key) {
            Some(existing) => existing,
            None => self.upload(EntityKind::Image, uri, stage_key, path.to_path_buf())?,
        };
        Ok(is_link.then_some(location))
    }

    fn upload(
        &mut self,
        kind: EntityKind,
        uri: &str,
        key: &str,
        path: PathBuf,
    ) -> Result<String, ImageError> {
        let location = upload_and_record(self.uploader, &mut *self.store, kind, uri, key, &path)?;
        self.produced
            .insert((kind, uri.to_string(), key.to_string()), location.clone());
        self.uploads += 1;
        if let Some(cb) = &self.progress {
            cb.on_image_uploaded(uri, key, &location);
        }
        Ok(location)
    }

    /// Resolve an `upload` directive: a local file uploaded once as-is.
    pub fn process_upload(&mut self, argument: &str) -> Result<UploadedFile, ImageError> {
        let source = self.staging.source_path(argument);
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| argument.to_string());
        let mime = mime_guess::from_path(&source)
            .first_or_octet_stream()
            .to_string();
        let size = std::fs::metadata(&source).ok().map(|m| m.len());

        let location = match self.lookup(EntityKind::Upload, argument, UPLOADED) {
            Some(location) => {
                debug!("Cache hit: {} [{}]", argument, UPLOADED);
                if let Some(cb) = &self.progress {
                    cb.on_cache_hit(argument, UPLOADED);
                }
                location
            }
            None => {
                if size.is_none() {
                    return Err(ImageError::Fetch {
                        uri: argument.to_string(),
                        reason: format!("{} does not exist", source.display()),
                    });
                }
                self.upload(EntityKind::Upload, argument, UPLOADED, source)?
            }
        };

        Ok(UploadedFile {
            location,
            name,
            mime,
            size,
        })
    }
}
