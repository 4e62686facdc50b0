//! Publishing entry points.
//!
//! [`publish_sync`] does the work on the calling thread: load the document,
//! check its fields, resolve every image and upload directive through the
//! [`ImagePipeline`], render HTML and, unless previewing, create or update
//! the post. [`publish`] runs the same thing on tokio's blocking pool.
//!
//! A failing directive aborts the run before anything is posted. Records
//! written up to that point stay (the document is saved after every upload),
//! and staged temp files are removed either way.

use crate::config::PublishConfig;
use crate::document::{Block, Directive, DocumentContext};
use crate::error::{ImageError, PressError};
use crate::host::{ContentHost, Post, PostKind};
use crate::pipeline::form::compute_form;
use crate::pipeline::orchestrator::{ImagePipeline, ImageRequest, RenderedImageRef, UploadedFile};
use crate::pipeline::staging::{CleanupList, HttpFetcher, StagingDir};
use crate::pipeline::store::{ArtifactStore, EntityKind, PostInfo};
use crate::pipeline::transform::ImageTransformer;
use crate::pipeline::upload::UploadGateway;
use crate::render;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One resolved image directive.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedImage {
    pub uri: String,
    pub form: String,
    #[serde(flatten)]
    pub rendered: RenderedImageRef,
}

/// Result of a publish (or preview) run.
///
/// Holds the run's temporary staging files: a preview's HTML points at them,
/// so they are deleted only when the output is dropped (or
/// [`cleanup`](Self::cleanup) is called).
#[derive(Debug, Serialize)]
pub struct PublishOutput {
    pub title: Option<String>,
    pub html: String,
    /// Host id of the post; `None` for previews.
    pub post_id: Option<String>,
    pub kind: PostKind,
    pub published: bool,
    pub preview: bool,
    pub images: Vec<ResolvedImage>,
    pub files: Vec<UploadedFile>,
    /// Uploads performed by this run.
    pub uploads: usize,
    pub duration_ms: u64,
    #[serde(skip)]
    cleanup: CleanupList,
}

impl PublishOutput {
    /// Temporary files that will be removed with this output.
    pub fn staged_files(&self) -> &[PathBuf] {
        self.cleanup.files()
    }

    /// Remove the temporary staging files now.
    pub fn cleanup(&mut self) {
        self.cleanup.cleanup_all();
    }
}

/// Fields the host needs, checked before anything is uploaded.
#[derive(Debug, Clone)]
struct PostFields {
    title: String,
    categories: Vec<String>,
    tags: Vec<String>,
    kind: PostKind,
}

/// Publish the document at `path` on the calling thread.
///
/// `host` may be `None` only for previews.
pub fn publish_sync(
    path: impl AsRef<Path>,
    config: &PublishConfig,
    host: Option<&dyn ContentHost>,
) -> Result<PublishOutput, PressError> {
    let start = Instant::now();
    let path = path.as_ref();
    info!(
        "{} {}",
        if config.preview { "Previewing" } else { "Publishing" },
        path.display()
    );

    let host = match (config.preview, host) {
        (true, _) => None,
        (false, Some(h)) => Some(h),
        (false, None) => {
            return Err(PressError::InvalidConfig(
                "a content host is required unless previewing".into(),
            ))
        }
    };

    // ── Step 1: Load and scan ────────────────────────────────────────────
    let mut document = DocumentContext::load(path)?.read_only(config.preview);
    let blocks = document.scan()?;
    let directives: Vec<&Directive> = blocks
        .iter()
        .filter_map(|b| match b {
            Block::Directive(d) => Some(d),
            Block::Markup(_) => None,
        })
        .collect();
    debug!("Found {} directives", directives.len());

    // ── Step 2: Check fields ─────────────────────────────────────────────
    let fields = match host {
        Some(h) => Some(check_fields(&document, config, h)?),
        None => None,
    };

    // ── Step 3: Resolve directives ───────────────────────────────────────
    let staging = StagingDir::resolve(path, config.persist_uploads(), &config.temp_dir)
        .map_err(run_error)?;
    let fetcher =
        HttpFetcher::new(staging.document_dir(), config.download_timeout_secs).map_err(run_error)?;
    let gateway = match host {
        Some(h) => UploadGateway::new(h).overwrite(true),
        None => UploadGateway::preview(),
    };
    let mut cleanup = CleanupList::new();

    let resolved = {
        let mut store = ArtifactStore::open(config.storage_mode, &mut document, &config.images_file)
            .map_err(run_error)?;
        let mut pipeline = ImagePipeline::new(
            &fetcher,
            &ImageTransformer,
            &gateway,
            &mut store,
            &staging,
            &mut cleanup,
        )
        .with_progress(config.progress_callback.clone());
        resolve_directives(&mut pipeline, &directives, config)?
    };

    // ── Step 4: Render ───────────────────────────────────────────────────
    let html = render::render_body(&blocks, &resolved.fragments, &config.known_links);

    let mut output = PublishOutput {
        title: document.field_text("title").map(String::from),
        html,
        post_id: None,
        kind: PostKind::Post,
        published: false,
        preview: config.preview,
        images: resolved.images,
        files: resolved.files,
        uploads: resolved.uploads,
        duration_ms: 0,
        cleanup,
    };

    // ── Step 5: Post ─────────────────────────────────────────────────────
    if let (Some(host), Some(fields)) = (host, fields) {
        let published = decide_publish(&document, config)?;
        let post = Post {
            title: fields.title,
            body: render::replace_newlines(&output.html),
            categories: fields.categories,
            tags: fields.tags,
            kind: fields.kind,
        };

        let mut info = PostInfo::new(config.storage_mode, &mut document, &config.posts_file);
        let id = match info.get("id")? {
            Some(id) => {
                host.edit_post(&id, &post, published)?;
                id
            }
            None => {
                let id = host.new_post(&post, published)?;
                info.set("id", &id)?;
                id
            }
        };
        info.set("title", &post.title)?;

        output.post_id = Some(id);
        output.kind = post.kind;
        output.published = published;
    }

    document.save().map_err(|e| PressError::io(path, e))?;
    output.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Done in {}ms ({} directives, {} uploads)",
        output.duration_ms,
        output.images.len() + output.files.len(),
        output.uploads
    );
    Ok(output)
}

/// Async wrapper around [`publish_sync`].
///
/// The pipeline does blocking network and image work, so it runs on
/// `tokio::task::spawn_blocking`.
pub async fn publish(
    path: impl AsRef<Path>,
    config: &PublishConfig,
    host: Option<Arc<dyn ContentHost>>,
) -> Result<PublishOutput, PressError> {
    let path = path.as_ref().to_path_buf();
    let config = config.clone();
    tokio::task::spawn_blocking(move || publish_sync(&path, &config, host.as_deref()))
        .await
        .map_err(|e| PressError::Internal(format!("Publish task panicked: {}", e)))?
}

// ── Directives ───────────────────────────────────────────────────────────

struct Resolved {
    fragments: Vec<String>,
    images: Vec<ResolvedImage>,
    files: Vec<UploadedFile>,
    uploads: usize,
}

/// Resolve every directive in document order.
///
/// All image requests are registered first, so an intermediate form that
/// another directive asks for is uploaded when it is produced.
fn resolve_directives(
    pipeline: &mut ImagePipeline<'_>,
    directives: &[&Directive],
    config: &PublishConfig,
) -> Result<Resolved, PressError> {
    let total = directives.len();
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_document_start(total);
    }

    let mut requests: Vec<Option<ImageRequest>> = Vec::with_capacity(total);
    for d in directives {
        let request = match d.kind {
            EntityKind::Image => Some(d.image_request()?),
            EntityKind::Upload => None,
        };
        if let Some(r) = &request {
            pipeline.request_form(r);
        }
        requests.push(request);
    }

    let mut resolved = Resolved {
        fragments: Vec::with_capacity(total),
        images: Vec::new(),
        files: Vec::new(),
        uploads: 0,
    };
    for (i, (d, request)) in directives.iter().zip(&requests).enumerate() {
        if let Some(cb) = cb {
            cb.on_directive_start(i + 1, total, &d.argument);
        }
        let form = request
            .as_ref()
            .map(|r| compute_form(&r.transforms))
            .unwrap_or_default();

        let result = match request {
            Some(r) => pipeline.process(r).map(|rendered| {
                resolved
                    .fragments
                    .push(render::image_html(&rendered, &d.image_attrs()));
                resolved.images.push(ResolvedImage {
                    uri: r.source_uri.clone(),
                    form: form.clone(),
                    rendered,
                });
            }),
            None => pipeline.process_upload(&d.argument).map(|file| {
                resolved.fragments.push(render::upload_html(&file));
                resolved.files.push(file);
            }),
        };

        if let Err(source) = result {
            if let Some(cb) = cb {
                cb.on_directive_error(i + 1, total, &source.to_string());
            }
            return Err(PressError::Image {
                uri: d.argument.clone(),
                form,
                source,
            });
        }
    }

    resolved.uploads = pipeline.uploads();
    if let Some(cb) = cb {
        cb.on_document_complete(total, resolved.uploads);
    }
    Ok(resolved)
}

/// Errors of the run's setup (staging directory, record file, HTTP client).
fn run_error(e: ImageError) -> PressError {
    match e {
        ImageError::Io { path, source } => PressError::Io { path, source },
        other => PressError::Internal(other.to_string()),
    }
}

// ── Fields ───────────────────────────────────────────────────────────────

/// List value of `name`, falling back to its singular `alias`.
fn list_field(document: &DocumentContext, name: &str, alias: &str) -> Vec<String> {
    document
        .field(name)
        .filter(|v| !v.is_empty())
        .or_else(|| document.field(alias))
        .map(|v| v.as_list())
        .unwrap_or_default()
}

fn check_fields(
    document: &DocumentContext,
    config: &PublishConfig,
    host: &dyn ContentHost,
) -> Result<PostFields, PressError> {
    let title = document
        .field_text("title")
        .ok_or_else(|| PressError::MissingField {
            field: "title".into(),
            hint: "add a ':title:' line to the document header".into(),
        })?
        .to_string();

    let mut categories = list_field(document, "categories", "category");
    if categories.is_empty() {
        match &config.default_category {
            Some(c) => categories.push(c.clone()),
            None => {
                return Err(PressError::MissingField {
                    field: "categories".into(),
                    hint: "add ':categories:' to the header or set default_category".into(),
                })
            }
        }
    }

    let tags = list_field(document, "tags", "tag");
    if let Some(bad) = tags.iter().find(|t| t.contains(',')) {
        return Err(PressError::InvalidField {
            field: "tags".into(),
            detail: format!("tag '{bad}' contains a comma"),
        });
    }

    let kind = match document.field_text("type") {
        None | Some("post") => PostKind::Post,
        Some("page") => PostKind::Page,
        Some(other) => {
            return Err(PressError::InvalidField {
                field: "type".into(),
                detail: format!("expected post or page, got '{other}'"),
            })
        }
    };

    if config.check_taxonomy {
        // One round trip per taxonomy, not per name.
        let known_categories = host.categories()?;
        if let Some(missing) = categories
            .iter()
            .find(|c| !known_categories.iter().any(|k| &k.name == *c))
        {
            return Err(PressError::UnknownCategory {
                name: missing.clone(),
            });
        }
        if !tags.is_empty() {
            let known_tags = host.tags()?;
            for tag in tags.iter().filter(|t| !known_tags.iter().any(|k| &k.name == *t)) {
                warn!("Tag '{}' does not exist yet; the host will create it", tag);
            }
        }
    }

    Ok(PostFields {
        title,
        categories,
        tags,
        kind,
    })
}

/// CLI override, then the `:publish:` field, then the configured default.
fn decide_publish(document: &DocumentContext, config: &PublishConfig) -> Result<bool, PressError> {
    if let Some(v) = config.publish {
        return Ok(v);
    }
    if let Some(v) = document.field_text("publish") {
        return parse_flag(v).ok_or_else(|| PressError::InvalidField {
            field: "publish".into(),
            detail: format!("expected yes or no, got '{v}'"),
        });
    }
    Ok(config.publish_default.unwrap_or(false))
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Some(true),
        "no" | "false" | "off" | "0" => Some(false),
        _ => None,
    }
}
