//! CLI binary for pressmark.
//!
//! A thin shim over the library crate that maps CLI flags and the config
//! file to `PublishConfig`, connects to the host and prints results.
//!
//! `main` is synchronous: the XML-RPC client and the image pipeline use
//! reqwest's blocking client, which must not run inside a tokio runtime.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pressmark::{
    publish_sync, ConfigFile, ContentHost, PressError, ProgressCallback, PublishConfig,
    PublishOutput, PublishProgressCallback, WordPressClient,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar over the document's directives plus a log line per upload.
struct CliProgressCallback {
    bar: ProgressBar,
    hits: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos:>3}/{len}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Images");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            hits: AtomicUsize::new(0),
        })
    }
}

impl PublishProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_directives: usize) {
        self.bar.set_length(total_directives as u64);
    }

    fn on_directive_start(&self, index: usize, _total: usize, uri: &str) {
        if index > 1 {
            self.bar.inc(1);
        }
        self.bar.set_message(uri.to_string());
    }

    fn on_cache_hit(&self, _uri: &str, _key: &str) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }

    fn on_image_uploaded(&self, uri: &str, key: &str, location: &str) {
        self.bar.println(format!(
            "  {} {}  {}  {}",
            green("↑"),
            uri,
            dim(&format!("[{key}]")),
            dim(location)
        ));
    }

    fn on_directive_error(&self, index: usize, total: usize, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!("  {} {:>3}/{:<3}  {}", red("✗"), index, total, red(&msg)));
        self.bar.abandon();
    }

    fn on_document_complete(&self, total_directives: usize, uploads: usize) {
        self.bar.finish_and_clear();
        if total_directives > 0 {
            eprintln!(
                "{} {} directives, {} uploaded, {} already recorded",
                green("✔"),
                bold(&total_directives.to_string()),
                uploads,
                self.hits.load(Ordering::SeqCst)
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Publish (or update) a post
  pressmark post.md

  # Render locally and open the result in the browser
  pressmark -n post.md

  # Publish as draft regardless of the document's :publish: field
  pressmark --no-publish post.md

  # Show the blog's tags
  pressmark --list-tags

DOCUMENT FORMAT:
  :title: Winter at the lake
  :categories: Photos
  :tags: winter, lake
  :publish: yes

  Some *Markdown* text.

  .. image:: http://example.com/lake.jpg
     :rotate: 90
     :scale: 0.25
     :alt: The lake

  .. upload:: notes.pdf

  Uploaded locations are written back as :uploaded-<form>: options (or to
  the INI side files, see data_storage), so images are uploaded only once.

CONFIG FILE:
  <config dir>/pressmark/config.toml; a template is written on first run.

  [account]
  url = "https://blog.example.org/xmlrpc.php"
  username = "joe_user"
  password = "..."

  [config]
  data_storage = "file"          # file | external-config | both
  publish_default = true
  save_uploads = false

  [links]
  rust = "https://www.rust-lang.org/"

ENVIRONMENT VARIABLES:
  PRESSMARK_CONFIG   Path to the config file
  RUST_LOG           Log filter, e.g. pressmark=debug
"#;

/// Publish Markdown documents to WordPress.
#[derive(Parser, Debug)]
#[command(
    name = "pressmark",
    version,
    about = "Publish Markdown documents to WordPress, uploading each image form once",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to publish.
    #[arg(required_unless_present_any = ["list_tags", "list_categories"])]
    file: Option<PathBuf>,

    /// Render to HTML and open it in the browser; nothing is uploaded or saved.
    #[arg(short = 'n', long)]
    preview: bool,

    /// Config file (default: <config dir>/pressmark/config.toml).
    #[arg(short, long, env = "PRESSMARK_CONFIG")]
    config: Option<PathBuf>,

    /// Skip checking categories and tags against the blog.
    #[arg(long)]
    dont_check_tags: bool,

    /// Print the blog's tags and exit.
    #[arg(long)]
    list_tags: bool,

    /// Print the blog's categories and exit.
    #[arg(long)]
    list_categories: bool,

    /// Publish the post, overriding the document and config.
    #[arg(long, conflicts_with = "no_publish")]
    publish: bool,

    /// Save as draft, overriding the document and config.
    #[arg(long)]
    no_publish: bool,

    /// Keep staged images in uploads/ next to the document.
    #[arg(long, env = "PRESSMARK_SAVE_UPLOADS")]
    save_uploads: bool,

    /// Output structured JSON instead of a summary.
    #[arg(long)]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PRESSMARK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PRESSMARK_QUIET")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(ConfigFile::default_path);

    // ── Taxonomy listing ─────────────────────────────────────────────────
    if cli.list_tags || cli.list_categories {
        let file = load_config_file(&config_path)?;
        let host = WordPressClient::connect(&file.account, 120)
            .with_context(|| format!("Failed to connect to {}", file.account.url))?;
        return list_taxonomy(&cli, &host);
    }

    let Some(document) = cli.file.clone() else {
        anyhow::bail!("No document given");
    };

    // ── Build config ─────────────────────────────────────────────────────
    // A preview never needs credentials, so an unconfigured setup still works.
    let file = match load_config_file(&config_path) {
        Ok(file) => Some(file),
        Err(e) if cli.preview => {
            warn!("{e:#}; previewing with default settings");
            None
        }
        Err(e) => return Err(e),
    };

    let show_progress = !cli.quiet && !cli.json;
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PublishProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, file.as_ref(), progress)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let host = match (&file, cli.preview) {
        (Some(file), false) => Some(
            WordPressClient::connect(&file.account, config.download_timeout_secs)
                .with_context(|| format!("Failed to connect to {}", file.account.url))?,
        ),
        _ => None,
    };
    let output = publish_sync(
        &document,
        &config,
        host.as_ref().map(|h| h as &dyn ContentHost),
    )
    .with_context(|| format!("Failed to publish {}", document.display()))?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    }

    if cli.preview {
        show_preview(&output, cli.quiet)?;
    } else if !cli.quiet && !cli.json {
        eprintln!(
            "{}  {} {}  {}  {}ms",
            green("✔"),
            if output.published { "Published" } else { "Saved draft" },
            bold(output.title.as_deref().unwrap_or("(untitled)")),
            dim(&format!("id {}", output.post_id.as_deref().unwrap_or("?"))),
            output.duration_ms,
        );
    }

    Ok(())
}

/// Load the config file; a fresh template gets a hint on where to edit it.
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    match ConfigFile::load(path) {
        Ok(file) => Ok(file),
        Err(PressError::ConfigMissing { path }) => {
            eprintln!(
                "{} Edit {} and fill in your blog's XML-RPC url and credentials.",
                cyan("ℹ"),
                bold(&path.display().to_string())
            );
            anyhow::bail!("pressmark is not configured yet ({})", path.display())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read config {}", path.display())),
    }
}

/// Map CLI args and the config file to `PublishConfig`.
fn build_config(
    cli: &Cli,
    file: Option<&ConfigFile>,
    progress: Option<ProgressCallback>,
) -> Result<PublishConfig> {
    let mut builder = match file {
        Some(file) => file.builder(),
        None => PublishConfig::builder(),
    }
    .preview(cli.preview)
    .check_taxonomy(!cli.dont_check_tags);

    if cli.save_uploads {
        builder = builder.save_uploads(true);
    }
    if cli.publish {
        builder = builder.publish(true);
    } else if cli.no_publish {
        builder = builder.publish(false);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn list_taxonomy(cli: &Cli, host: &dyn ContentHost) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.list_categories {
        let categories = host.categories().context("Failed to list categories")?;
        if cli.json {
            writeln!(out, "{}", serde_json::to_string_pretty(&categories)?)?;
        } else {
            for c in &categories {
                writeln!(out, "{}  {}", c.name, dim(&c.description))?;
            }
        }
    }
    if cli.list_tags {
        let tags = host.tags().context("Failed to list tags")?;
        if cli.json {
            writeln!(out, "{}", serde_json::to_string_pretty(&tags)?)?;
        } else {
            for t in &tags {
                writeln!(out, "{}  {}", t.name, dim(&format!("({})", t.count)))?;
            }
        }
    }
    Ok(())
}

/// Write the preview HTML to a temp file and open it in the browser.
///
/// The staged images it points at are removed when `output` is dropped, so
/// the browser gets a few seconds to load them first.
fn show_preview(output: &PublishOutput, quiet: bool) -> Result<()> {
    let mut page = tempfile::Builder::new()
        .prefix("pressmark-")
        .suffix(".html")
        .tempfile()
        .context("Failed to create preview file")?;
    let title = output.title.as_deref().unwrap_or("Preview");
    write!(
        page,
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<h1>{}</h1>\n{}</body></html>\n",
        html_escape::encode_text(title),
        html_escape::encode_text(title),
        output.html
    )
    .context("Failed to write preview file")?;

    if !quiet {
        eprintln!("{} Preview at {}", cyan("◆"), bold(&page.path().display().to_string()));
    }
    open::that(page.path()).context("Failed to open the browser")?;
    std::thread::sleep(Duration::from_secs(5));
    Ok(())
}
