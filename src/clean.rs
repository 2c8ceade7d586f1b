//! Removal of orphaned outputs.
//!
//! An output is orphaned when the input it was built from is gone. Two
//! passes find them:
//!
//! - [`remove_stale`] diffs the previous cache against this build's inputs
//!   and deletes the recorded outputs of inputs that disappeared. Only
//!   possible in incremental mode, but it reports deletions by input name.
//! - [`sweep_output`] walks the output tree and deletes every visible file
//!   that no current input produces. This catches everything the cache does
//!   not know about: outputs of a build that never saved a cache, files
//!   dropped into the output by hand, renamed outputs.
//!
//! Hidden entries (the build cache, editor droppings) are never touched.
//! Directories emptied by a deletion are pruned up to the output root.
//! Cleanup is best effort: failures are logged and reported, never fatal.

use crate::cache::BuildCache;
use crate::discover::relative_key;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// What a cleanup pass deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Output-relative paths of deleted files.
    pub removed: Vec<String>,
    /// Output-relative paths that could not be deleted, with the reason.
    pub failed: Vec<(String, String)>,
    /// Number of directories pruned after becoming empty.
    pub pruned_dirs: usize,
}

impl CleanupReport {
    pub fn merge(&mut self, other: CleanupReport) {
        self.removed.extend(other.removed);
        self.failed.extend(other.failed);
        self.pruned_dirs += other.pruned_dirs;
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Delete the recorded outputs of inputs that were in `prior` but are not in
/// `seen`. Outputs still claimed by a current input are left alone.
pub fn remove_stale(
    output_root: &Path,
    prior: &BuildCache,
    seen: &HashSet<String>,
    expected: &HashSet<String>,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let mut touched_dirs = BTreeSet::new();

    for (input, entry) in &prior.files {
        if seen.contains(input) || expected.contains(&entry.output) {
            continue;
        }
        debug!("input {input} removed; deleting {}", entry.output);
        delete_file(output_root, &entry.output, &mut report, &mut touched_dirs);
    }

    report.pruned_dirs = prune_empty_dirs(output_root, touched_dirs);
    report
}

/// Delete every visible file under `output_root` that is neither expected
/// nor protected.
pub fn sweep_output(
    output_root: &Path,
    expected: &HashSet<String>,
    protected: &HashSet<String>,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    let mut touched_dirs = BTreeSet::new();

    let walker = WalkDir::new(output_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    let mut orphans = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable output entry: {e}");
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = match relative_key(output_root, entry.path()) {
            Ok(rel) => rel,
            Err(e) => {
                warn!("skipping output entry: {e}");
                continue;
            }
        };
        if !expected.contains(&rel) && !protected.contains(&rel) {
            orphans.push(rel);
        }
    }

    for rel in orphans {
        debug!("sweeping orphaned output {rel}");
        delete_file(output_root, &rel, &mut report, &mut touched_dirs);
    }

    report.pruned_dirs = prune_empty_dirs(output_root, touched_dirs);
    report
}

fn delete_file(
    output_root: &Path,
    rel: &str,
    report: &mut CleanupReport,
    touched_dirs: &mut BTreeSet<String>,
) {
    let path = output_root.join(rel);
    // The recorded output may since have become a directory of new outputs.
    if fs::symlink_metadata(&path).is_ok_and(|meta| meta.is_dir()) {
        return;
    }
    match fs::remove_file(&path) {
        Ok(()) => report.removed.push(rel.to_string()),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) => {}
        Err(e) => {
            warn!("could not remove {rel}: {e}");
            report.failed.push((rel.to_string(), e.to_string()));
            return;
        }
    }
    let mut dir = rel;
    while let Some((parent, _)) = dir.rsplit_once('/') {
        touched_dirs.insert(parent.to_string());
        dir = parent;
    }
}

/// Remove the given directories if empty, deepest first. The output root
/// itself is never removed.
fn prune_empty_dirs(output_root: &Path, dirs: BTreeSet<String>) -> usize {
    let mut dirs: Vec<String> = dirs.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));

    dirs.iter()
        .filter(|rel| fs::remove_dir(output_root.join(rel.as_str())).is_ok())
        .count()
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CACHE_FILENAME;
    use crate::test_helpers::{site_fixture, tree_paths};

    fn set(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // =========================================================================
    // remove_stale
    // =========================================================================

    #[test]
    fn stale_outputs_are_removed() {
        let out = site_fixture(&[("a.html", "a"), ("b.txt", "b"), ("posts/c.html", "c")]);
        let mut prior = BuildCache::empty();
        prior.insert("a.md".into(), 1, "a.html".into());
        prior.insert("b.txt".into(), 1, "b.txt".into());
        prior.insert("posts/c.md".into(), 1, "posts/c.html".into());

        let report = remove_stale(
            out.path(),
            &prior,
            &set(&["a.md"]),
            &set(&["a.html"]),
        );

        assert_eq!(report.removed, vec!["b.txt", "posts/c.html"]);
        assert_eq!(report.pruned_dirs, 1);
        assert_eq!(tree_paths(out.path()), vec!["a.html"]);
        assert!(!out.path().join("posts").exists());
    }

    #[test]
    fn missing_stale_output_is_not_an_error() {
        let out = site_fixture(&[]);
        let mut prior = BuildCache::empty();
        prior.insert("gone.md".into(), 1, "gone.html".into());

        let report = remove_stale(out.path(), &prior, &HashSet::new(), &HashSet::new());
        assert!(report.is_empty());
    }

    #[test]
    fn stale_output_claimed_by_new_input_is_kept() {
        // a.md was replaced by a hand-written a.html asset.
        let out = site_fixture(&[("a.html", "new asset")]);
        let mut prior = BuildCache::empty();
        prior.insert("a.md".into(), 1, "a.html".into());

        let report = remove_stale(
            out.path(),
            &prior,
            &set(&["a.html"]),
            &set(&["a.html"]),
        );
        assert!(report.is_empty());
        assert!(out.path().join("a.html").exists());
    }

    #[test]
    fn stale_output_that_changed_shape_is_left_to_the_build() {
        // `x` became a directory, and `y/z.html`'s parent became a file.
        let out = site_fixture(&[("x/new.html", ""), ("y", "")]);
        let mut prior = BuildCache::empty();
        prior.insert("x".into(), 1, "x".into());
        prior.insert("y/z.md".into(), 1, "y/z.html".into());

        let report = remove_stale(out.path(), &prior, &HashSet::new(), &HashSet::new());

        assert!(report.is_empty());
        assert_eq!(tree_paths(out.path()), vec!["x/new.html", "y"]);
    }

    // =========================================================================
    // sweep_output
    // =========================================================================

    #[test]
    fn sweep_removes_unexpected_files() {
        let out = site_fixture(&[
            ("index.html", ""),
            ("old.html", ""),
            ("img/logo.png", ""),
            ("drafts/x.html", ""),
        ]);
        let report = sweep_output(
            out.path(),
            &set(&["index.html", "img/logo.png"]),
            &HashSet::new(),
        );

        assert_eq!(report.removed, vec!["drafts/x.html", "old.html"]);
        assert_eq!(report.pruned_dirs, 1);
        assert_eq!(tree_paths(out.path()), vec!["img/logo.png", "index.html"]);
    }

    #[test]
    fn sweep_keeps_hidden_and_protected() {
        let out = site_fixture(&[
            (CACHE_FILENAME, "{}"),
            (".well-known/thing", ""),
            ("feed.xml", ""),
            ("stray.txt", ""),
        ]);
        let report = sweep_output(out.path(), &HashSet::new(), &set(&["feed.xml"]));

        assert_eq!(report.removed, vec!["stray.txt"]);
        assert_eq!(
            tree_paths(out.path()),
            vec![".inkpress-cache", ".well-known/thing", "feed.xml"]
        );
    }

    #[test]
    fn sweep_leaves_non_empty_dirs() {
        let out = site_fixture(&[("a/b/keep.html", ""), ("a/b/drop.html", "")]);
        let report = sweep_output(out.path(), &set(&["a/b/keep.html"]), &HashSet::new());

        assert_eq!(report.pruned_dirs, 0);
        assert!(out.path().join("a/b").is_dir());
    }

    #[test]
    fn report_merge_accumulates() {
        let mut a = CleanupReport {
            removed: vec!["x".into()],
            failed: vec![],
            pruned_dirs: 1,
        };
        a.merge(CleanupReport {
            removed: vec!["y".into()],
            failed: vec![("z".into(), "denied".into())],
            pruned_dirs: 2,
        });
        assert_eq!(a.removed, vec!["x", "y"]);
        assert_eq!(a.failed.len(), 1);
        assert_eq!(a.pruned_dirs, 3);
    }
}
