//! Configuration types for document publishing.
//!
//! Run behaviour is controlled through [`PublishConfig`], built via its
//! [`PublishConfigBuilder`]. Host credentials live separately in
//! [`AccountConfig`] so a preview run never needs them.
//!
//! Both are usually produced from the user's TOML config file
//! ([`ConfigFile`]), found under `dirs::config_dir()/pressmark/config.toml`
//! unless `--config` points elsewhere.

use crate::error::PressError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

/// Placeholder URL written into the config template.
pub const DEFAULT_HOST_URL: &str = "http://wordpress.example.com/wordpress/xmlrpc.php";

/// Where artifact records and post info are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// Records live in the document itself as directive options / header
    /// fields, so the document is self-describing and portable. (default)
    #[default]
    File,
    /// Records live in INI side files keyed by `"<kind> <uri>"` sections.
    #[serde(alias = "dotrc")]
    ExternalConfig,
    /// Write both; read the document first.
    Both,
}

impl StorageMode {
    /// Whether records are mirrored into the document text.
    pub fn uses_document(self) -> bool {
        matches!(self, StorageMode::File | StorageMode::Both)
    }

    /// Whether records are written to the INI side files.
    pub fn uses_side_file(self) -> bool {
        matches!(self, StorageMode::ExternalConfig | StorageMode::Both)
    }
}

impl std::str::FromStr for StorageMode {
    type Err = PressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StorageMode::File),
            "external-config" | "dotrc" => Ok(StorageMode::ExternalConfig),
            "both" => Ok(StorageMode::Both),
            other => Err(PressError::InvalidConfig(format!(
                "data_storage must be file, external-config or both, got '{other}'"
            ))),
        }
    }
}

/// Configuration for one publish run.
///
/// Built via [`PublishConfig::builder()`] or using [`PublishConfig::default()`].
///
/// # Example
/// ```rust
/// use pressmark::{PublishConfig, StorageMode};
///
/// let config = PublishConfig::builder()
///     .storage_mode(StorageMode::Both)
///     .save_uploads(true)
///     .build()
///     .unwrap();
/// assert!(config.save_uploads);
/// ```
#[derive(Clone)]
pub struct PublishConfig {
    /// Where artifact records and post info go. Default: [`StorageMode::File`].
    pub storage_mode: StorageMode,

    /// Keep staged images in an `uploads/` directory next to the document
    /// instead of a temp directory that is emptied at the end of the run.
    /// Default: false.
    pub save_uploads: bool,

    /// Render without contacting the host or mutating any record. Default: false.
    pub preview: bool,

    /// Publish (`true`) or keep as draft (`false`), overriding the document's
    /// `:publish:` field. Default: None.
    pub publish: Option<bool>,

    /// Publish (vs. draft) when neither the CLI nor the document decides. Default: None.
    pub publish_default: Option<bool>,

    /// Category used when the document names none.
    pub default_category: Option<String>,

    /// Verify categories and tags exist on the host before posting. Default: true.
    pub check_taxonomy: bool,

    /// INI file holding image/upload records in external-config mode.
    pub images_file: PathBuf,

    /// INI file holding post info (id, title) in external-config mode.
    pub posts_file: PathBuf,

    /// Shared staging directory for non-persisted runs.
    pub temp_dir: PathBuf,

    /// Link definitions appended to every document (`name → url`).
    pub known_links: BTreeMap<String, String>,

    /// Timeout for image downloads in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-image progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        let base = default_data_dir();
        Self {
            storage_mode: StorageMode::default(),
            save_uploads: false,
            preview: false,
            publish: None,
            publish_default: None,
            default_category: None,
            check_taxonomy: true,
            images_file: base.join("images.ini"),
            posts_file: base.join("posts.ini"),
            temp_dir: std::env::temp_dir().join("pressmark"),
            known_links: BTreeMap::new(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PublishConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishConfig")
            .field("storage_mode", &self.storage_mode)
            .field("save_uploads", &self.save_uploads)
            .field("preview", &self.preview)
            .field("publish", &self.publish)
            .field("publish_default", &self.publish_default)
            .field("default_category", &self.default_category)
            .field("check_taxonomy", &self.check_taxonomy)
            .field("images_file", &self.images_file)
            .field("posts_file", &self.posts_file)
            .field("temp_dir", &self.temp_dir)
            .field("known_links", &self.known_links.len())
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PublishProgressCallback>"),
            )
            .finish()
    }
}

impl PublishConfig {
    /// Create a new builder for `PublishConfig`.
    pub fn builder() -> PublishConfigBuilder {
        PublishConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether staged files survive the run.
    pub fn persist_uploads(&self) -> bool {
        self.save_uploads && !self.preview
    }
}

/// Builder for [`PublishConfig`].
#[derive(Debug)]
pub struct PublishConfigBuilder {
    config: PublishConfig,
}

impl PublishConfigBuilder {
    pub fn storage_mode(mut self, mode: StorageMode) -> Self {
        self.config.storage_mode = mode;
        self
    }

    pub fn save_uploads(mut self, v: bool) -> Self {
        self.config.save_uploads = v;
        self
    }

    pub fn preview(mut self, v: bool) -> Self {
        self.config.preview = v;
        self
    }

    pub fn publish(mut self, v: bool) -> Self {
        self.config.publish = Some(v);
        self
    }

    pub fn publish_default(mut self, v: bool) -> Self {
        self.config.publish_default = Some(v);
        self
    }

    pub fn default_category(mut self, name: impl Into<String>) -> Self {
        self.config.default_category = Some(name.into());
        self
    }

    pub fn check_taxonomy(mut self, v: bool) -> Self {
        self.config.check_taxonomy = v;
        self
    }

    pub fn images_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.images_file = path.into();
        self
    }

    pub fn posts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.posts_file = path.into();
        self
    }

    pub fn temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = path.into();
        self
    }

    pub fn known_link(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.config.known_links.insert(name.into(), url.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PublishConfig, PressError> {
        let c = &self.config;
        if c.download_timeout_secs == 0 {
            return Err(PressError::InvalidConfig(
                "Download timeout must be ≥ 1 second".into(),
            ));
        }
        if c.temp_dir.as_os_str().is_empty() {
            return Err(PressError::InvalidConfig("temp_dir must not be empty".into()));
        }
        if let Some(name) = c.known_links.keys().find(|k| k.trim().is_empty()) {
            return Err(PressError::InvalidConfig(format!(
                "known link names must not be blank (got {name:?})"
            )));
        }
        Ok(self.config)
    }
}

// ── Host credentials ─────────────────────────────────────────────────────

/// Credentials and endpoint of the content host.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// XML-RPC endpoint, e.g. `https://blog.example.org/xmlrpc.php`.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Blog to post to. The first blog of the user when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blog_id: Option<String>,
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("blog_id", &self.blog_id)
            .finish()
    }
}

// ── Config file ──────────────────────────────────────────────────────────

/// On-disk configuration, `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub account: AccountConfig,
    #[serde(default)]
    pub config: RunSection,
    /// Known links appended to every document.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
}

/// The `[config]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default)]
    pub data_storage: StorageMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_default: Option<bool>,
    #[serde(default)]
    pub save_uploads: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
}

impl ConfigFile {
    /// Default location: `<config dir>/pressmark/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pressmark")
            .join("config.toml")
    }

    /// A template with placeholder credentials.
    pub fn template() -> Self {
        Self {
            account: AccountConfig {
                url: DEFAULT_HOST_URL.to_string(),
                username: "joe_user".to_string(),
                password: "trustNo1".to_string(),
                blog_id: None,
            },
            config: RunSection {
                data_storage: StorageMode::File,
                publish_default: Some(true),
                ..Default::default()
            },
            links: BTreeMap::new(),
        }
    }

    /// Load the config file at `path`.
    ///
    /// A missing file is replaced by [`ConfigFile::template`] and reported as
    /// [`PressError::ConfigMissing`]; a file still holding the template URL
    /// is rejected the same way.
    pub fn load(path: &Path) -> Result<Self, PressError> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| PressError::io(parent, e))?;
            }
            let text = toml::to_string_pretty(&Self::template())
                .map_err(|e| PressError::Internal(format!("config template: {e}")))?;
            std::fs::write(path, text).map_err(|e| PressError::io(path, e))?;
            info!("Wrote config template to {}", path.display());
            return Err(PressError::ConfigMissing {
                path: path.to_path_buf(),
            });
        }

        let text = std::fs::read_to_string(path).map_err(|e| PressError::io(path, e))?;
        let parsed = Self::parse(&text)?;
        if parsed.account.url == DEFAULT_HOST_URL {
            return Err(PressError::ConfigMissing {
                path: path.to_path_buf(),
            });
        }
        info!("Loaded config from {}", path.display());
        Ok(parsed)
    }

    /// Parse TOML text.
    pub fn parse(text: &str) -> Result<Self, PressError> {
        toml::from_str(text).map_err(|e| PressError::InvalidConfig(e.to_string()))
    }

    /// Seed a [`PublishConfigBuilder`] from the `[config]` and `[links]` tables.
    pub fn builder(&self) -> PublishConfigBuilder {
        let c = &self.config;
        let mut builder = PublishConfig::builder()
            .storage_mode(c.data_storage)
            .save_uploads(c.save_uploads);
        if let Some(v) = c.publish_default {
            builder = builder.publish_default(v);
        }
        if let Some(ref cat) = c.default_category {
            builder = builder.default_category(cat.clone());
        }
        if let Some(ref p) = c.images_file {
            builder = builder.images_file(p.clone());
        }
        if let Some(ref p) = c.posts_file {
            builder = builder.posts_file(p.clone());
        }
        if let Some(ref p) = c.temp_dir {
            builder = builder.temp_dir(p.clone());
        }
        for (name, url) in &self.links {
            builder = builder.known_link(name.clone(), url.clone());
        }
        builder
    }
}

fn default_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pressmark")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_mode_parses_aliases() {
        assert_eq!("file".parse::<StorageMode>().unwrap(), StorageMode::File);
        assert_eq!(
            "dotrc".parse::<StorageMode>().unwrap(),
            StorageMode::ExternalConfig
        );
        assert_eq!(
            "external-config".parse::<StorageMode>().unwrap(),
            StorageMode::ExternalConfig
        );
        assert_eq!("Both".parse::<StorageMode>().unwrap(), StorageMode::Both);
        assert!("sqlite".parse::<StorageMode>().is_err());
    }

    #[test]
    fn storage_mode_flags() {
        assert!(StorageMode::File.uses_document());
        assert!(!StorageMode::File.uses_side_file());
        assert!(!StorageMode::ExternalConfig.uses_document());
        assert!(StorageMode::Both.uses_document() && StorageMode::Both.uses_side_file());
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = PublishConfig::builder().download_timeout_secs(0).build();
        assert!(err.is_err());
    }

    #[test]
    fn preview_never_persists_uploads() {
        let config = PublishConfig::builder()
            .save_uploads(true)
            .preview(true)
            .build()
            .unwrap();
        assert!(!config.persist_uploads());
    }

    #[test]
    fn config_file_round_trips_through_builder() {
        let text = r#"
[account]
url = "https://blog.example.org/xmlrpc.php"
username = "ethan"
password = "hunter2"

[config]
data_storage = "dotrc"
save_uploads = true
default_category = "Uncategorized"

[links]
rust = "https://www.rust-lang.org/"
"#;
        let file = ConfigFile::parse(text).unwrap();
        assert_eq!(file.config.data_storage, StorageMode::ExternalConfig);
        let config = file.builder().build().unwrap();
        assert!(config.save_uploads);
        assert_eq!(config.default_category.as_deref(), Some("Uncategorized"));
        assert_eq!(
            config.known_links.get("rust").map(String::as_str),
            Some("https://www.rust-lang.org/")
        );
        assert!(!format!("{:?}", file.account).contains("hunter2"));
    }

    #[test]
    fn missing_config_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pressmark").join("config.toml");
        let err = ConfigFile::load(&path).unwrap_err();
        assert!(matches!(err, PressError::ConfigMissing { .. }));
        assert!(path.exists());
        // The template itself is still unconfigured.
        assert!(matches!(
            ConfigFile::load(&path).unwrap_err(),
            PressError::ConfigMissing { .. }
        ));
    }
}
