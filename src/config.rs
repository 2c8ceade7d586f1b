//! Site configuration module.
//!
//! Handles loading, validating, and merging the optional `config.toml` at the
//! root of the input directory. Stock defaults are overridden by whatever the
//! file sets, and command-line flags override both (see `main.rs`).
//!
//! ## Config File Location
//!
//! ```text
//! site/
//! ├── config.toml              # Site config (optional, never published)
//! ├── header.md                # Header partial (optional, never published)
//! ├── footer.md                # Footer partial (optional, never published)
//! ├── index.md
//! └── posts/
//!     └── ...
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [build]
//! document_extensions = ["md", "markdown"]
//! incremental = true
//! keep_orphans = false
//! size_threshold = 14336     # bytes of gzipped output; 0 disables the check
//!
//! [template]
//! name = "default"           # built-in name, or a path to an .html template
//! header = "header.md"       # relative to the input directory
//! footer = "footer.md"
//! include_header = true
//! include_footer = true
//!
//! [feed]
//! base_url = ""              # empty disables feed.xml
//! max_items = 20             # 0 keeps every item
//!
//! [serve]
//! host = "127.0.0.1"
//! port = 8080
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the site config file inside the input directory.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Build behaviour: document classification, cache use, cleanup.
    pub build: BuildConfig,
    /// Page template and header/footer partials.
    pub template: TemplateConfig,
    /// RSS feed generation.
    pub feed: FeedConfig,
    /// Local preview server.
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.document_extensions.is_empty() {
            return Err(ConfigError::Validation(
                "build.document_extensions must not be empty".into(),
            ));
        }
        for ext in &self.build.document_extensions {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(ConfigError::Validation(format!(
                    "build.document_extensions entry {ext:?} must be a bare extension like \"md\""
                )));
            }
            if ext == "html" {
                return Err(ConfigError::Validation(
                    "build.document_extensions cannot contain \"html\" (it is the output extension)"
                        .into(),
                ));
            }
        }
        validate_feed_url(&self.feed.base_url)?;
        if self.serve.port == 0 {
            return Err(ConfigError::Validation("serve.port must be non-zero".into()));
        }
        Ok(())
    }
}

/// Check a feed base URL: empty (feed disabled) or `http(s)://…`.
pub fn validate_feed_url(url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(
            "feed.base_url must start with http:// or https://".into(),
        ))
    }
}

/// Build behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Extensions (without the dot, case-sensitive) that mark a file as a
    /// Markdown document. Everything else is copied as an asset.
    pub document_extensions: Vec<String>,
    /// Reuse the build cache to skip unchanged files.
    pub incremental: bool,
    /// Leave output files behind when their input disappears.
    pub keep_orphans: bool,
    /// Gzipped page size (bytes) above which a warning is printed.
    pub size_threshold: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            document_extensions: vec!["md".to_string(), "markdown".to_string()],
            incremental: true,
            keep_orphans: false,
            size_threshold: 14 * 1024,
        }
    }
}

/// Page template and partials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TemplateConfig {
    /// Built-in template name (`default`, `minimal`) or a template file path.
    pub name: String,
    /// Header partial, relative to the input directory.
    pub header: String,
    /// Footer partial, relative to the input directory.
    pub footer: String,
    pub include_header: bool,
    pub include_footer: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            header: "header.md".to_string(),
            footer: "footer.md".to_string(),
            include_header: true,
            include_footer: true,
        }
    }
}

/// RSS feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    /// Public base URL of the site. Empty disables the feed.
    pub base_url: String,
    /// Maximum number of feed items; 0 keeps them all.
    pub max_items: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            max_items: 20,
        }
    }
}

/// Preview server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if the directory has no config file.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join(CONFIG_FILENAME);
    if !config_path.is_file() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge user values on top of stock defaults, then deserialize and validate.
pub fn load_config(input_root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let merged = match load_raw_config(input_root)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# inkpress configuration
# ======================
# Place this file at the root of the input directory. Every setting is
# optional; the values below are the defaults. Command-line flags win over
# anything set here. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Build
# ---------------------------------------------------------------------------
[build]
# Extensions (no dot, case-sensitive) rendered as Markdown documents.
# Every other file is copied to the output unchanged.
document_extensions = ["md", "markdown"]

# Skip files whose modification time matches the previous build.
# Set to false (or pass --full) to rebuild everything.
incremental = true

# Keep output files whose source was deleted.
keep_orphans = false

# Warn when a page is larger than this many bytes after gzip.
# 14336 bytes fits the first TCP round trip. 0 disables the check.
size_threshold = 14336

# ---------------------------------------------------------------------------
# Template
# ---------------------------------------------------------------------------
[template]
# "default", "minimal", or a path to an HTML template file.
name = "default"

# Markdown partials injected into every page (paths relative to this file).
header = "header.md"
footer = "footer.md"
include_header = true
include_footer = true

# ---------------------------------------------------------------------------
# RSS feed
# ---------------------------------------------------------------------------
[feed]
# Public URL of the site, e.g. "https://example.com". Empty = no feed.xml.
base_url = ""

# Newest N documents in the feed. 0 keeps every document.
max_items = 20

# ---------------------------------------------------------------------------
# Preview server (inkpress serve)
# ---------------------------------------------------------------------------
[serve]
host = "127.0.0.1"
port = 8080
"##
}
