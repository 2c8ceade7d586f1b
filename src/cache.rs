//! Build cache for incremental rebuilds.
//!
//! Rendering a page is cheap, but a site with a few thousand documents and a
//! pile of images still spends most of a rebuild rewriting files that did not
//! change. This module remembers, for every input path, the modification time
//! it had when it was last built and the output it produced, so the next
//! build can skip it.
//!
//! # Design
//!
//! ## Cache keys
//!
//! Entries are keyed by the input-relative path (`posts/hello.md`) and store
//! the input's modification time in whole seconds since the epoch plus the
//! output-relative path it was written to. A file is considered unchanged
//! only when its mtime is identical, so touching a file is enough to force a
//! rebuild of it.
//!
//! ## Storage
//!
//! The cache is a JSON file at `<output_dir>/.inkpress-cache`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "files": {
//!     "posts/hello.md": { "mtime": 1723000000, "output": "posts/hello.html" }
//!   }
//! }
//! ```
//!
//! The leading dot keeps it out of discovery and out of the orphan sweep. The
//! map is a `BTreeMap` so identical builds serialize byte-identical caches.
//! Saving writes a temporary sibling and renames it over the old file, so a
//! crash mid-write never leaves a truncated cache behind.
//!
//! ## Versioning
//!
//! [`BuildCache::load`] rejects any file whose `version` differs from
//! [`CACHE_VERSION`], and any file with an entry whose output is not a plain
//! relative path (`..`, a root, a drive prefix, or empty). Cleanup deletes
//! recorded outputs, so those must stay inside the output directory. Callers
//! treat every load failure the same way: no cache, full rebuild.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Name of the cache file within the output directory.
pub const CACHE_FILENAME: &str = ".inkpress-cache";

/// Version of the cache format. Bump this to invalidate all existing caches
/// when the format or the meaning of an entry changes.
pub const CACHE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cache version {found} does not match expected version {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    #[error("cache entry {input} records output {output:?} outside the output directory")]
    UnsafeOutput { input: String, output: String },
}

/// What the previous build recorded for one input file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    /// Input modification time, seconds since the epoch.
    pub mtime: i64,
    /// Output path, relative to the output directory.
    pub output: String,
}

/// On-disk cache mapping input paths to what they were built into.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildCache {
    pub version: u32,
    pub files: BTreeMap<String, CacheEntry>,
}

impl BuildCache {
    /// Create an empty cache at the current version.
    pub fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            files: BTreeMap::new(),
        }
    }

    /// Load a cache file.
    ///
    /// Fails when the file is missing, unreadable, malformed, or written by a
    /// different cache version.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let content = fs::read_to_string(path)?;
        let cache: Self = serde_json::from_str(&content)?;
        if cache.version != CACHE_VERSION {
            return Err(CacheError::VersionMismatch {
                found: cache.version,
                expected: CACHE_VERSION,
            });
        }
        if let Some((input, entry)) = cache
            .files
            .iter()
            .find(|(_, entry)| !is_contained(&entry.output))
        {
            return Err(CacheError::UnsafeOutput {
                input: input.clone(),
                output: entry.output.clone(),
            });
        }
        Ok(cache)
    }

    /// Write the cache, replacing any previous file in full.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = temp_path(path);
        fs::write(&tmp, json + "\n")?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Record the state of one input file.
    pub fn insert(&mut self, input: String, mtime: i64, output: String) {
        self.files.insert(input, CacheEntry { mtime, output });
    }

    pub fn get(&self, input: &str) -> Option<&CacheEntry> {
        self.files.get(input)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Resolve the cache file path for an output directory.
pub fn cache_path(output_dir: &Path) -> PathBuf {
    output_dir.join(CACHE_FILENAME)
}

/// Modification time of `path` in whole seconds since the epoch.
///
/// Times before the epoch come back negative rather than failing.
pub fn file_mtime(path: &Path) -> io::Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(system_time_secs(modified))
}

/// True when `rel` names something strictly below the directory it is
/// joined onto.
fn is_contained(rel: &str) -> bool {
    let path = Path::new(rel);
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

fn system_time_secs(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
