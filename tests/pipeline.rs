//! Integration tests for the image pipeline.
//!
//! Fetching, transforming and uploading are replaced by recording fakes
//! except where a test says otherwise; the store is either an in-memory
//! store or the document itself.

use pressmark::document::DocumentContext;
use pressmark::pipeline::form::{compute_form, TransformSpec};
use pressmark::pipeline::orchestrator::{ImagePipeline, ImageRequest, RenderedImageRef};
use pressmark::pipeline::staging::{derived_path, CleanupList, Fetcher, HttpFetcher, StagingDir};
use pressmark::pipeline::store::{ArtifactStore, EntityKind, MemoryStore, RecordStore};
use pressmark::pipeline::transform::{ImageTransformer, ScaleSpec, Transformer};
use pressmark::pipeline::upload::{UploadGateway, Uploader};
use pressmark::{ImageError, StorageMode};
use std::cell::RefCell;
use std::path::{Path, PathBuf};

const URI: &str = "http://example.com/foo.jpg";

// ── Fakes ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingFetcher {
    calls: RefCell<Vec<String>>,
}

impl Fetcher for RecordingFetcher {
    fn fetch(&self, uri: &str, dest: &Path) -> Result<(), ImageError> {
        self.calls.borrow_mut().push(uri.to_string());
        std::fs::write(dest, b"not really a jpeg").map_err(|e| ImageError::Io {
            path: dest.to_path_buf(),
            source: e,
        })
    }
}

#[derive(Default)]
struct RecordingTransformer {
    calls: RefCell<Vec<String>>,
}

impl RecordingTransformer {
    fn step(&self, path: &Path, suffix: String) -> Result<PathBuf, ImageError> {
        let out = derived_path(path, &suffix);
        self.calls.borrow_mut().push(suffix);
        std::fs::copy(path, &out).map_err(|e| ImageError::Io {
            path: out.clone(),
            source: e,
        })?;
        Ok(out)
    }
}

impl Transformer for RecordingTransformer {
    fn rotate(&self, path: &Path, degrees: &str) -> Result<PathBuf, ImageError> {
        self.step(path, format!("rot{degrees}"))
    }

    fn scale(&self, path: &Path, spec: &str) -> Result<PathBuf, ImageError> {
        self.step(path, format!("scale{spec}"))
    }
}

/// Pretends every file lands at `http://host/<file name>`.
#[derive(Default)]
struct RecordingUploader {
    uploaded: RefCell<Vec<String>>,
}

impl Uploader for RecordingUploader {
    fn upload(&self, path: &Path) -> Result<String, ImageError> {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.uploaded.borrow_mut().push(name.clone());
        Ok(format!("http://host/{name}"))
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    staging: StagingDir,
    fetcher: RecordingFetcher,
    transformer: RecordingTransformer,
    uploader: RecordingUploader,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingDir::resolve(&dir.path().join("post.md"), false, &dir.path().join("tmp"))
            .unwrap();
        Self {
            _dir: dir,
            staging,
            fetcher: RecordingFetcher::default(),
            transformer: RecordingTransformer::default(),
            uploader: RecordingUploader::default(),
        }
    }

    /// Resolve `requests` in one run; returns the results and the upload count.
    fn run(
        &self,
        store: &mut dyn RecordStore,
        requests: &[ImageRequest],
    ) -> (Vec<Result<RenderedImageRef, ImageError>>, usize) {
        let mut cleanup = CleanupList::new();
        let mut pipeline = ImagePipeline::new(
            &self.fetcher,
            &self.transformer,
            &self.uploader,
            store,
            &self.staging,
            &mut cleanup,
        );
        for r in requests {
            pipeline.request_form(r);
        }
        let results = requests.iter().map(|r| pipeline.process(r)).collect();
        (results, pipeline.uploads())
    }
}

fn rotated_scaled(rotate: &str, scale: &str) -> ImageRequest {
    ImageRequest::new(URI).with_transforms(TransformSpec::new().with_rotate(rotate).with_scale(scale))
}

// ── Properties ───────────────────────────────────────────────────────────

#[test]
fn second_run_uploads_nothing() {
    let h = Harness::new();
    let mut store = MemoryStore::new();
    let requests = [
        ImageRequest::new(URI),
        rotated_scaled("90", "0.25"),
        ImageRequest::new("http://example.com/bar.png")
            .with_transforms(TransformSpec::new().with_scale("200x150")),
    ];

    let (first, uploads) = h.run(&mut store, &requests);
    assert!(first.iter().all(Result::is_ok));
    assert!(uploads > 0);
    let fetches = h.fetcher.calls.borrow().len();
    let records = store.len();

    let (second, uploads) = h.run(&mut store, &requests);
    assert_eq!(uploads, 0);
    assert_eq!(h.fetcher.calls.borrow().len(), fetches);
    assert_eq!(store.len(), records);
    let first: Vec<_> = first.into_iter().map(Result::unwrap).collect();
    let second: Vec<_> = second.into_iter().map(Result::unwrap).collect();
    assert_eq!(first, second);
}

#[test]
fn form_depends_only_on_the_transform_set() {
    let a = TransformSpec::new().with_scale("0.25").with_rotate("90");
    let b = TransformSpec::new().with_rotate(" 90").with_scale("0.25 ");
    assert_eq!(compute_form(&a), "rot90-scale0.25");
    assert_eq!(compute_form(&a), compute_form(&b));
    assert_eq!(ImageRequest::new(URI).with_transforms(a).key(), "uploaded-rot90-scale0.25");
}

#[test]
fn rotate_then_scale_uploads_both_forms_and_links_to_rotated() {
    let h = Harness::new();
    let mut store = MemoryStore::new();

    let (results, uploads) = h.run(&mut store, &[rotated_scaled("90", "0.25")]);
    let rendered = results.into_iter().next().unwrap().unwrap();

    assert_eq!(*h.transformer.calls.borrow(), vec!["rot90", "scale0.25"]);
    assert_eq!(uploads, 2);
    assert_eq!(rendered.display_location, "http://host/foo-rot90-scale0.25.jpg");
    assert_eq!(rendered.link_target.as_deref(), Some("http://host/foo-rot90.jpg"));
    assert_eq!(
        store.lookup(EntityKind::Image, URI, "uploaded-rot90").as_deref(),
        Some("http://host/foo-rot90.jpg")
    );
    assert_eq!(
        store.lookup(EntityKind::Image, URI, "uploaded-rot90-scale0.25").as_deref(),
        Some("http://host/foo-rot90-scale0.25.jpg")
    );
    // The untransformed original is neither shown nor linked.
    assert_eq!(store.lookup(EntityKind::Image, URI, "uploaded"), None);
    assert_eq!(ScaleSpec::Factor(0.25).target_size(4000, 3000), (1000, 750));
}

#[test]
fn cache_hit_does_no_work() {
    let h = Harness::new();
    let mut store = MemoryStore::new()
        .with(EntityKind::Image, URI, "uploaded", "http://host/x.jpg")
        .with(EntityKind::Image, URI, "uploaded-rot90", "http://host/x-90.jpg")
        .with(EntityKind::Image, URI, "uploaded-rot90-scale0.25", "http://host/x-90-s.jpg");

    let rotated = ImageRequest::new(URI).with_transforms(TransformSpec::new().with_rotate("90"));
    let (results, uploads) = h.run(&mut store, &[rotated, rotated_scaled("90", "0.25")]);
    let results: Vec<_> = results.into_iter().map(Result::unwrap).collect();

    assert_eq!(results[0].display_location, "http://host/x-90.jpg");
    assert_eq!(results[0].link_target, None);
    assert_eq!(results[1].display_location, "http://host/x-90-s.jpg");
    assert_eq!(results[1].link_target.as_deref(), Some("http://host/x-90.jpg"));
    assert_eq!(uploads, 0);
    assert!(h.fetcher.calls.borrow().is_empty());
    assert!(h.transformer.calls.borrow().is_empty());
    assert!(h.uploader.uploaded.borrow().is_empty());
    assert_eq!(store.writes(), 0);
}

#[test]
fn cache_hit_without_full_size_record_stays_unlinked() {
    let h = Harness::new();
    let mut store = MemoryStore::new().with(
        EntityKind::Image,
        URI,
        "uploaded-rot90-scale0.25",
        "http://host/x-90-s.jpg",
    );

    let (results, uploads) = h.run(&mut store, &[rotated_scaled("90", "0.25")]);
    let result = results.into_iter().next().unwrap().unwrap();

    assert_eq!(result.display_location, "http://host/x-90-s.jpg");
    assert_eq!(result.link_target, None);
    assert_eq!(uploads, 0);
    assert!(h.fetcher.calls.borrow().is_empty());
    assert!(h.transformer.calls.borrow().is_empty());
    assert!(h.uploader.uploaded.borrow().is_empty());
    assert_eq!(store.writes(), 0);
}

#[test]
fn changed_scale_adds_a_record_and_keeps_the_old_ones() {
    let text = "\
:title: Lake

.. image:: http://example.com/foo.jpg
   :rotate: 90
   :scale: 0.5
   :uploaded-rot90: http://host/old-rot90.jpg
   :uploaded-rot90-scale0.25: http://host/old-small.jpg
";
    let mut doc = DocumentContext::from_text(text);
    doc.scan().unwrap();

    let h = Harness::new();
    let rendered = {
        let mut store = ArtifactStore::open(StorageMode::File, &mut doc, h.staging.path().join("images.ini"))
            .unwrap();
        let (results, uploads) = h.run(&mut store, &[rotated_scaled("90", "0.5")]);
        assert_eq!(uploads, 1);
        results.into_iter().next().unwrap().unwrap()
    };

    assert_eq!(rendered.display_location, "http://host/foo-rot90-scale0.5.jpg");
    assert_eq!(rendered.link_target.as_deref(), Some("http://host/old-rot90.jpg"));
    assert_eq!(*h.uploader.uploaded.borrow(), vec!["foo-rot90-scale0.5.jpg"]);

    let out = doc.text();
    assert!(out.contains("   :uploaded-rot90: http://host/old-rot90.jpg\n"));
    assert!(out.contains("   :uploaded-rot90-scale0.25: http://host/old-small.jpg\n"));
    assert!(out.contains("   :uploaded-rot90-scale0.5: http://host/foo-rot90-scale0.5.jpg"));
    assert_eq!(
        doc.record(EntityKind::Image, URI, "uploaded-rot90-scale0.25"),
        Some("http://host/old-small.jpg")
    );
}

#[test]
fn uri_without_extension_is_refused_before_fetching() {
    let h = Harness::new();
    let mut store = MemoryStore::new();
    let (results, uploads) = h.run(
        &mut store,
        &[ImageRequest::new("http://example.com/download?id=42")],
    );

    match results.into_iter().next().unwrap() {
        Err(ImageError::AmbiguousFilename { uri }) => {
            assert_eq!(uri, "http://example.com/download?id=42")
        }
        other => panic!("expected AmbiguousFilename, got {other:?}"),
    }
    assert_eq!(uploads, 0);
    assert!(h.fetcher.calls.borrow().is_empty());
    assert!(store.is_empty());
}

#[test]
fn preview_renders_local_paths_and_records_nothing() {
    let h = Harness::new();
    let mut store = MemoryStore::new();
    let gateway = UploadGateway::preview();
    let mut cleanup = CleanupList::new();

    let rendered = {
        let mut pipeline = ImagePipeline::new(
            &h.fetcher,
            &h.transformer,
            &gateway,
            &mut store,
            &h.staging,
            &mut cleanup,
        );
        pipeline.process(&rotated_scaled("90", "0.25")).unwrap()
    };

    let display = Path::new(&rendered.display_location);
    assert!(display.is_absolute());
    assert!(display.exists());
    assert!(rendered.display_location.ends_with("foo-rot90-scale0.25.jpg"));
    assert!(rendered
        .link_target
        .as_deref()
        .is_some_and(|t| t.ends_with("foo-rot90.jpg")));
    assert!(store.is_empty());
    assert_eq!(store.writes(), 0);

    // Temporary staging files go away with the run.
    let staged: Vec<PathBuf> = cleanup.files().to_vec();
    assert!(!staged.is_empty());
    drop(cleanup);
    assert!(staged.iter().all(|f| !f.exists()));
}

#[test]
fn real_image_is_rotated_then_scaled() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("photo.png");
    image::RgbImage::from_fn(40, 32, |x, y| image::Rgb([(x * 6) as u8, (y * 7) as u8, 90]))
        .save(&source)
        .unwrap();

    let staging = StagingDir::resolve(&dir.path().join("post.md"), true, dir.path()).unwrap();
    let fetcher = HttpFetcher::new(dir.path(), 5).unwrap();
    let gateway = UploadGateway::preview();
    let mut store = MemoryStore::new();
    let mut cleanup = CleanupList::new();
    let mut pipeline = ImagePipeline::new(
        &fetcher,
        &ImageTransformer,
        &gateway,
        &mut store,
        &staging,
        &mut cleanup,
    );

    let request = ImageRequest::new("photo.png")
        .with_transforms(TransformSpec::new().with_rotate("90").with_scale("0.25"));
    let rendered = pipeline.process(&request).unwrap();

    let out = image::open(&rendered.display_location).unwrap();
    assert_eq!((out.width(), out.height()), (10, 8));
    assert!(staging.path().join("photo-rot90.png").exists());
    assert!(staging.path().join("photo-rot90-scale0.25.png").exists());
}
