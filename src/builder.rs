//! Build orchestration.
//!
//! One call to [`Builder::build`] turns the input tree into the output tree:
//!
//! ```text
//! validate roots ─→ discover ─→ check output collisions ─→ choose strategy
//!        │                                                        │
//!        │                       ┌────── Incremental (cache loads)┤
//!        │                       │       Full (forced / no cache) ┘
//!        ▼                       ▼
//!   create output    process changed files (or all) ─→ drain size advisories
//!                                         │
//!                                         ▼
//!                    feed.xml ─→ remove orphans ─→ save cache
//! ```
//!
//! ## Strategy
//!
//! A build is **incremental** when the previous build's cache loads and its
//! version matches; every other case (forced, missing, unreadable, old
//! version) is a **full** build. In incremental mode an input is skipped
//! only when its mtime equals the cached one, it maps to the same output as
//! before, and that output still exists.
//!
//! ## Crash safety
//!
//! The previous cache file is deleted before the first output is written and
//! the new one is saved only after everything succeeded. A build that fails
//! midway therefore leaves no cache, and the next build is a full one.
//!
//! ## Orphans
//!
//! Unless `keep_orphans` is set, outputs of deleted inputs are removed: by
//! cache diff in incremental mode, then by sweeping the output tree in every
//! mode. See [`crate::clean`].

use crate::advisory::SizeAdvisory;
use crate::cache::{self, BuildCache, CacheError, file_mtime};
use crate::clean::{self, CleanupReport};
use crate::config::{CONFIG_FILENAME, SiteConfig};
use crate::discover::{self, DiscoverError, DiscoveryRules, FileKind, output_path};
use crate::feed::{FEED_FILENAME, FeedError, FeedGenerator};
use crate::process::{ArtifactProcessor, PageContext, ProcessError};
use crate::render::{MarkdownRenderer, Renderer};
use crate::template::Templater;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default header partial, relative to the input root.
pub const DEFAULT_HEADER: &str = "header.md";
/// Default footer partial, relative to the input root.
pub const DEFAULT_FOOTER: &str = "footer.md";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("input directory not found: {}", .0.display())]
    InputNotFound(PathBuf),
    #[error("input path is not a directory: {}", .0.display())]
    InputNotDirectory(PathBuf),
    #[error(
        "output directory {} must not be the input directory or contain it ({})",
        output.display(),
        input.display()
    )]
    OverlappingRoots { input: PathBuf, output: PathBuf },
    #[error("failed to create output directory {}: {source}", path.display())]
    CreateOutput { path: PathBuf, source: io::Error },
    #[error("{first} and {second} would both be written to {output}")]
    OutputCollision {
        first: String,
        second: String,
        output: String,
    },
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("build cache: {0}")]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Feed(#[from] FeedError),
}

/// Where a header or footer partial comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialSource {
    /// The conventional file in the input root, used only if present.
    Default,
    /// An explicit file. A missing file is reported and skipped.
    Path(PathBuf),
    /// No partial.
    Disabled,
}

/// RSS feed settings; the feed is generated only when these are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOptions {
    pub base_url: String,
    pub max_items: usize,
}

/// Everything that shapes one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Ignore the cache and rebuild everything.
    pub force_full: bool,
    /// Leave outputs of deleted inputs in place.
    pub keep_orphans: bool,
    /// Gzipped page size above which an advisory is flagged; 0 disables.
    pub size_threshold: usize,
    pub document_extensions: Vec<String>,
    /// Template selector, see [`Templater::resolve`].
    pub template: String,
    pub header: PartialSource,
    pub footer: PartialSource,
    pub feed: Option<FeedOptions>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_config(&SiteConfig::default(), Path::new("."))
    }
}

impl BuildOptions {
    /// Options as configured in `config.toml`. Partial paths are relative to
    /// `input_root`.
    pub fn from_config(config: &SiteConfig, input_root: &Path) -> Self {
        let partial = |enabled: bool, configured: &str, default: &str| {
            if !enabled {
                PartialSource::Disabled
            } else if configured == default {
                PartialSource::Default
            } else {
                PartialSource::Path(input_root.join(configured))
            }
        };
        let base_url = config.feed.base_url.trim();
        Self {
            force_full: !config.build.incremental,
            keep_orphans: config.build.keep_orphans,
            size_threshold: config.build.size_threshold,
            document_extensions: config.build.document_extensions.clone(),
            template: config.template.name.clone(),
            header: partial(
                config.template.include_header,
                &config.template.header,
                DEFAULT_HEADER,
            ),
            footer: partial(
                config.template.include_footer,
                &config.template.footer,
                DEFAULT_FOOTER,
            ),
            feed: (!base_url.is_empty()).then(|| FeedOptions {
                base_url: base_url.to_string(),
                max_items: config.feed.max_items,
            }),
        }
    }
}

/// Which way the build went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Incremental,
    Full,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Incremental => write!(f, "incremental"),
            Strategy::Full => write!(f, "full"),
        }
    }
}

/// Why the strategy was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyReason {
    /// `--full` or `incremental = false`.
    Forced,
    /// No cache file in the output directory.
    NoCache,
    /// The cache file exists but could not be read or parsed.
    Unreadable,
    /// The cache was written by a different cache version.
    VersionMismatch,
    CacheValid,
}

impl fmt::Display for StrategyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StrategyReason::Forced => "full rebuild requested",
            StrategyReason::NoCache => "no build cache",
            StrategyReason::Unreadable => "build cache unreadable",
            StrategyReason::VersionMismatch => "build cache from another version",
            StrategyReason::CacheValid => "build cache loaded",
        };
        f.write_str(text)
    }
}

/// Progress notifications, sent as the build runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    StrategyChosen {
        strategy: Strategy,
        reason: StrategyReason,
        files: usize,
    },
    Rendered {
        input: String,
        output: String,
    },
    Copied {
        input: String,
        output: String,
    },
    Unchanged {
        input: String,
    },
    Removed {
        output: String,
    },
    FeedWritten {
        items: usize,
    },
}

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub strategy: Strategy,
    pub reason: StrategyReason,
    /// Input paths rendered to HTML.
    pub rendered: Vec<String>,
    /// Input paths copied as assets.
    pub copied: Vec<String>,
    /// Input paths skipped as unchanged.
    pub unchanged: Vec<String>,
    pub cleanup: CleanupReport,
    /// One per rendered page, in processing order.
    pub advisories: Vec<SizeAdvisory>,
    /// Items in `feed.xml`, if one was written.
    pub feed_items: Option<usize>,
}

impl BuildReport {
    fn new(strategy: Strategy, reason: StrategyReason) -> Self {
        Self {
            strategy,
            reason,
            rendered: Vec::new(),
            copied: Vec::new(),
            unchanged: Vec::new(),
            cleanup: CleanupReport::default(),
            advisories: Vec::new(),
            feed_items: None,
        }
    }

    /// Number of files written this build.
    pub fn processed(&self) -> usize {
        self.rendered.len() + self.copied.len()
    }
}

/// Builds one input tree into one output tree.
pub struct Builder {
    input: PathBuf,
    output: PathBuf,
    options: BuildOptions,
    renderer: Box<dyn Renderer>,
    events: Option<Sender<BuildEvent>>,
}

impl Builder {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, options: BuildOptions) -> Self {
        let renderer = Box::new(MarkdownRenderer::new(options.document_extensions.clone()));
        Self {
            input: input.into(),
            output: output.into(),
            options,
            renderer,
            events: None,
        }
    }

    /// Use a different renderer for documents, partials and the feed.
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Report progress on `tx`.
    pub fn with_events(mut self, tx: Sender<BuildEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn build(&self) -> Result<BuildReport, BuildError> {
        let (input, output) = self.prepare_roots()?;

        let header = self.load_partial(&input, &self.options.header, DEFAULT_HEADER);
        let footer = self.load_partial(&input, &self.options.footer, DEFAULT_FOOTER);

        let mut rules = DiscoveryRules::new(self.options.document_extensions.clone());
        rules.reserved.insert(CONFIG_FILENAME.to_string());
        rules.reserved.extend(header.reserved.clone());
        rules.reserved.extend(footer.reserved.clone());
        if let Ok(nested) = output.strip_prefix(&input) {
            rules
                .excluded_dirs
                .push(discover::relative_key(Path::new(""), nested)?);
        }

        let files = discover::discover(&input, &rules)?;
        let outputs = self.derive_outputs(&files)?;

        let cache_file = cache::cache_path(&output);
        let (strategy, reason, prior) = self.choose_strategy(&cache_file);
        info!(
            "{strategy} build of {} files ({reason})",
            files.len()
        );
        self.emit(BuildEvent::StrategyChosen {
            strategy,
            reason,
            files: files.len(),
        });

        // From here on, a failure must leave no cache behind.
        match fs::remove_file(&cache_file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::Io(e).into()),
        }

        let templater = Templater::resolve(&self.options.template);
        let page = PageContext {
            renderer: self.renderer.as_ref(),
            templater: &templater,
            header: header.html.as_deref(),
            footer: footer.html.as_deref(),
        };
        let mut processor =
            ArtifactProcessor::new(&input, &output, page, self.options.size_threshold);

        let mut report = BuildReport::new(strategy, reason);
        let mut new_cache = BuildCache::empty();

        for ((kind, rel), out_rel) in files.entries().zip(&outputs) {
            let mtime = file_mtime(&input.join(rel)).map_err(|source| ProcessError::Stat {
                path: rel.to_string(),
                source,
            })?;

            let unchanged = prior.as_ref().is_some_and(|prior| {
                prior.get(rel).is_some_and(|entry| {
                    entry.mtime == mtime && entry.output == *out_rel && output.join(out_rel).exists()
                })
            });

            if unchanged {
                debug!("{rel} unchanged");
                report.unchanged.push(rel.to_string());
                self.emit(BuildEvent::Unchanged {
                    input: rel.to_string(),
                });
            } else {
                match kind {
                    FileKind::Document => {
                        processor.process_document(rel, out_rel)?;
                        debug!("rendered {rel} -> {out_rel}");
                        report.rendered.push(rel.to_string());
                        self.emit(BuildEvent::Rendered {
                            input: rel.to_string(),
                            output: out_rel.clone(),
                        });
                    }
                    FileKind::Asset => {
                        processor.process_asset(rel, out_rel)?;
                        debug!("copied {rel} -> {out_rel}");
                        report.copied.push(rel.to_string());
                        self.emit(BuildEvent::Copied {
                            input: rel.to_string(),
                            output: out_rel.clone(),
                        });
                    }
                }
            }

            new_cache.insert(rel.to_string(), mtime, out_rel.clone());
        }

        report.advisories = processor.finish();

        if let Some(feed) = &self.options.feed {
            let generator = FeedGenerator::new(&feed.base_url, feed.max_items, self.renderer.as_ref());
            report.feed_items = generator.generate(&files.documents, &input, &output)?;
            if let Some(items) = report.feed_items {
                self.emit(BuildEvent::FeedWritten { items });
            }
        }

        if !self.options.keep_orphans {
            let expected: HashSet<String> = outputs.iter().cloned().collect();
            let mut protected = HashSet::new();
            if report.feed_items.is_some() {
                protected.insert(FEED_FILENAME.to_string());
            }

            if let Some(prior) = &prior {
                let seen: HashSet<String> = files.entries().map(|(_, rel)| rel.to_string()).collect();
                report
                    .cleanup
                    .merge(clean::remove_stale(&output, prior, &seen, &expected));
            }
            report
                .cleanup
                .merge(clean::sweep_output(&output, &expected, &protected));

            for removed in &report.cleanup.removed {
                self.emit(BuildEvent::Removed {
                    output: removed.clone(),
                });
            }
        }

        new_cache.save(&cache_file)?;
        info!(
            "build finished: {} written, {} unchanged, {} removed",
            report.processed(),
            report.unchanged.len(),
            report.cleanup.removed.len()
        );
        Ok(report)
    }

    /// Check both roots and create the output. Returns canonical paths.
    fn prepare_roots(&self) -> Result<(PathBuf, PathBuf), BuildError> {
        let input = match fs::metadata(&self.input) {
            Ok(meta) if meta.is_dir() => self
                .input
                .canonicalize()
                .map_err(|_| BuildError::InputNotFound(self.input.clone()))?,
            Ok(_) => return Err(BuildError::InputNotDirectory(self.input.clone())),
            Err(_) => return Err(BuildError::InputNotFound(self.input.clone())),
        };

        // An output that does not exist yet cannot be the input or one of
        // its ancestors.
        if let Ok(existing) = self.output.canonicalize() {
            if input.starts_with(&existing) {
                return Err(BuildError::OverlappingRoots {
                    input: self.input.clone(),
                    output: self.output.clone(),
                });
            }
        }

        fs::create_dir_all(&self.output).map_err(|source| BuildError::CreateOutput {
            path: self.output.clone(),
            source,
        })?;
        let output = self
            .output
            .canonicalize()
            .map_err(|source| BuildError::CreateOutput {
                path: self.output.clone(),
                source,
            })?;
        Ok((input, output))
    }

    /// Output path for every discovered file, in `FileSet::entries` order.
    fn derive_outputs(&self, files: &discover::FileSet) -> Result<Vec<String>, BuildError> {
        let mut claimed: HashMap<String, String> = HashMap::new();
        if self.options.feed.is_some() {
            claimed.insert(FEED_FILENAME.to_string(), "the RSS feed".to_string());
        }

        let mut outputs = Vec::with_capacity(files.len());
        for (kind, rel) in files.entries() {
            let out = output_path(rel, kind);
            if let Some(first) = claimed.insert(out.clone(), rel.to_string()) {
                return Err(BuildError::OutputCollision {
                    first,
                    second: rel.to_string(),
                    output: out,
                });
            }
            outputs.push(out);
        }
        Ok(outputs)
    }

    fn choose_strategy(
        &self,
        cache_file: &Path,
    ) -> (Strategy, StrategyReason, Option<BuildCache>) {
        if self.options.force_full {
            return (Strategy::Full, StrategyReason::Forced, None);
        }
        match BuildCache::load(cache_file) {
            Ok(prior) => (Strategy::Incremental, StrategyReason::CacheValid, Some(prior)),
            Err(CacheError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                (Strategy::Full, StrategyReason::NoCache, None)
            }
            Err(CacheError::VersionMismatch { found, expected }) => {
                debug!("cache version {found}, expected {expected}");
                (Strategy::Full, StrategyReason::VersionMismatch, None)
            }
            Err(e) => {
                debug!("ignoring build cache: {e}");
                (Strategy::Full, StrategyReason::Unreadable, None)
            }
        }
    }

    fn load_partial(&self, input: &Path, source: &PartialSource, default: &str) -> Partial {
        let (path, explicit) = match source {
            PartialSource::Disabled => return Partial::default(),
            PartialSource::Default => (input.join(default), false),
            PartialSource::Path(path) => (path.clone(), true),
        };

        // Partials inside the input tree are site inputs, not pages.
        let reserved = path
            .canonicalize()
            .ok()
            .and_then(|abs| {
                abs.strip_prefix(input)
                    .ok()
                    .and_then(|rel| discover::relative_key(Path::new(""), rel).ok())
            })
            .into_iter()
            .collect();

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if explicit || e.kind() != io::ErrorKind::NotFound {
                    warn!("skipping partial {}: {e}", path.display());
                }
                return Partial {
                    html: None,
                    reserved,
                };
            }
        };
        match self.renderer.render(&bytes) {
            Ok(rendered) => Partial {
                html: Some(rendered.html),
                reserved,
            },
            Err(e) => {
                warn!("skipping partial {}: {e}", path.display());
                Partial {
                    html: None,
                    reserved,
                }
            }
        }
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }
}

/// A loaded header or footer.
#[derive(Debug, Default)]
struct Partial {
    html: Option<String>,
    /// Input-relative paths to keep out of discovery.
    reserved: Vec<String>,
}
