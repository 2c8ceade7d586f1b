//! Input tree discovery and classification.
//!
//! Walks the input directory in lexical order and splits every visible
//! regular file into one of two buckets:
//!
//! - **Documents**: the literal (case-sensitive) extension is one of the
//!   configured document extensions. These are rendered to HTML.
//! - **Assets**: everything else. These are copied byte for byte.
//!
//! Any path component starting with `.` hides the entry; hidden directories
//! are pruned without being read. A handful of input-relative paths are
//! *reserved*: they feed the build (the site config, header and footer
//! partials) but are never published, so they are skipped too.
//!
//! Paths in the resulting [`FileSet`] are relative to the input root and use
//! `/` separators on every platform, because they double as cache keys.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Extension given to rendered documents.
pub const HTML_EXTENSION: &str = "html";

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("failed to walk input directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}

/// How a discovered file is turned into output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Document,
    Asset,
}

/// Classification rules for one walk.
#[derive(Debug, Clone)]
pub struct DiscoveryRules {
    /// Bare extensions (`"md"`) that mark a file as a document.
    pub document_extensions: Vec<String>,
    /// Input-relative file paths that are skipped.
    pub reserved: HashSet<String>,
    /// Input-relative directories that are pruned (e.g. a nested output dir).
    pub excluded_dirs: Vec<String>,
}

impl DiscoveryRules {
    pub fn new(document_extensions: Vec<String>) -> Self {
        Self {
            document_extensions,
            reserved: HashSet::new(),
            excluded_dirs: Vec::new(),
        }
    }

    /// Classify a file by name. Only the text after the last `.` counts.
    pub fn classify(&self, rel_path: &str) -> FileKind {
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        match name.rsplit_once('.') {
            Some((stem, ext))
                if !stem.is_empty() && self.document_extensions.iter().any(|e| e == ext) =>
            {
                FileKind::Document
            }
            _ => FileKind::Asset,
        }
    }
}

impl Default for DiscoveryRules {
    fn default() -> Self {
        Self::new(vec!["md".to_string(), "markdown".to_string()])
    }
}

/// Files discovered in one walk, in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    pub documents: Vec<String>,
    pub assets: Vec<String>,
}

impl FileSet {
    pub fn len(&self) -> usize {
        self.documents.len() + self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.assets.is_empty()
    }

    /// Documents first, then assets; the order files are processed in.
    pub fn entries(&self) -> impl Iterator<Item = (FileKind, &str)> {
        self.documents
            .iter()
            .map(|p| (FileKind::Document, p.as_str()))
            .chain(self.assets.iter().map(|p| (FileKind::Asset, p.as_str())))
    }
}

/// Output-relative path for an input-relative path.
///
/// Documents swap their extension for `.html`; assets keep their path.
pub fn output_path(rel_path: &str, kind: FileKind) -> String {
    match kind {
        FileKind::Asset => rel_path.to_string(),
        FileKind::Document => {
            let (dir, name) = match rel_path.rsplit_once('/') {
                Some((dir, name)) => (Some(dir), name),
                None => (None, rel_path),
            };
            let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
            match dir {
                Some(dir) => format!("{dir}/{stem}.{HTML_EXTENSION}"),
                None => format!("{stem}.{HTML_EXTENSION}"),
            }
        }
    }
}

/// Walk `root` and classify every visible file.
pub fn discover(root: &Path, rules: &DiscoveryRules) -> Result<FileSet, DiscoverError> {
    let mut files = FileSet::default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !(is_hidden(entry) || is_excluded_entry(root, entry, rules))
        });

    for entry in walker {
        let entry = entry?;
        if entry.depth() == 0 {
            continue;
        }
        let rel_path = relative_key(root, entry.path())?;

        if entry.file_type().is_dir() {
            continue;
        }
        if !is_regular_file(&entry) {
            continue;
        }
        if rules.reserved.contains(&rel_path) {
            continue;
        }

        match rules.classify(&rel_path) {
            FileKind::Document => files.documents.push(rel_path),
            FileKind::Asset => files.assets.push(rel_path),
        }
    }

    Ok(files)
}

/// Convert `path` (under `root`) into a `/`-separated relative key.
pub fn relative_key(root: &Path, path: &Path) -> Result<String, DiscoverError> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let mut parts = Vec::new();
    for component in rel.components() {
        if let Component::Normal(part) = component {
            let part = part
                .to_str()
                .ok_or_else(|| DiscoverError::NonUtf8Path(path.to_path_buf()))?;
            parts.push(part);
        }
    }
    Ok(parts.join("/"))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn is_regular_file(entry: &DirEntry) -> bool {
    entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
}

/// True for an excluded directory itself; its contents are never visited.
fn is_excluded_entry(root: &Path, entry: &DirEntry, rules: &DiscoveryRules) -> bool {
    if rules.excluded_dirs.is_empty() || !entry.file_type().is_dir() {
        return false;
    }
    relative_key(root, entry.path())
        .is_ok_and(|rel| rules.excluded_dirs.iter().any(|dir| *dir == rel))
}
