//! Shared test utilities for the inkpress test suite.
//!
//! Builds throwaway input trees, pins modification times, and snapshots
//! output trees so pipeline tests can compare whole directories.
//!
//! # Usage
//!
//! ```rust,ignore
//! use crate::test_helpers::*;
//!
//! let input = site_fixture(&[("index.md", "# Home"), ("img/a.png", "png")]);
//! set_mtime(&input.path().join("index.md"), 1_700_000_000);
//! let tree = read_tree(output.path());
//! assert_eq!(tree["index.html"], ...);
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Create a temp directory populated with `(relative path, contents)` pairs.
pub fn site_fixture(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (rel, contents) in files {
        write_file(tmp.path(), rel, contents);
    }
    tmp
}

/// Write `contents` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
}

/// Pin a file's modification time to `secs` since the epoch.
pub fn set_mtime(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

/// Snapshot every file under `root` as `relative path → bytes`.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (rel, fs::read(e.path()).unwrap())
        })
        .collect()
}

/// Relative paths of every file under `root`, sorted.
pub fn tree_paths(root: &Path) -> Vec<String> {
    read_tree(root).into_keys().collect()
}
