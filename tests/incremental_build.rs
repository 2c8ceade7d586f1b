//! Whole-pipeline tests through the public API: build, change the input
//! tree, build again, and compare output trees and caches.

use inkpress::builder::{BuildOptions, BuildReport, Builder, FeedOptions, Strategy, StrategyReason};
use inkpress::cache::{BuildCache, CACHE_FILENAME};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use walkdir::WalkDir;

const T0: u64 = 1_700_000_000;

fn write(root: &Path, rel: &str, contents: &str, mtime: u64) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, contents).unwrap();
    let file = fs::File::options().write(true).open(&path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime))
        .unwrap();
}

fn tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
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

fn visible_paths(root: &Path) -> Vec<String> {
    tree(root)
        .into_keys()
        .filter(|p| !p.starts_with('.'))
        .collect()
}

fn cached_inputs(output: &Path) -> Vec<String> {
    BuildCache::load(&output.join(CACHE_FILENAME))
        .unwrap()
        .files
        .into_keys()
        .collect()
}

fn build(input: &Path, output: &Path, options: &BuildOptions) -> BuildReport {
    Builder::new(input, output, options.clone()).build().unwrap()
}

fn blog(input: &Path) {
    write(input, "index.md", "# My Blog\n\nNotes on things.", T0);
    write(input, "posts/first.md", "---\ntitle: First\ndate: 2024-01-02\n---\n# First\n\nHello.", T0 + 10);
    write(input, "posts/second.md", "# Second\n\nSee [first](first.md).", T0 + 20);
    write(input, "img/logo.png", "not really a png", T0);
    write(input, "header.md", "**My Blog**", T0);
}

fn feed_options() -> BuildOptions {
    BuildOptions {
        feed: Some(FeedOptions {
            base_url: "https://blog.example.com".into(),
            max_items: 20,
        }),
        ..BuildOptions::default()
    }
}

#[test]
fn modify_delete_add_scenario() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write(input.path(), "a.md", "# A", T0);
    write(input.path(), "b.txt", "b", T0);

    let first = build(input.path(), output.path(), &BuildOptions::default());
    assert_eq!(first.strategy, Strategy::Full);
    assert_eq!(visible_paths(output.path()), vec!["a.html", "b.txt"]);

    write(input.path(), "a.md", "# A, revised", T0 + 60);
    fs::remove_file(input.path().join("b.txt")).unwrap();
    write(input.path(), "c.txt", "c", T0 + 60);

    let second = build(input.path(), output.path(), &BuildOptions::default());
    assert_eq!(second.strategy, Strategy::Incremental);
    assert_eq!(second.rendered, vec!["a.md"]);
    assert_eq!(second.copied, vec!["c.txt"]);
    assert_eq!(second.cleanup.removed, vec!["b.txt"]);
    assert_eq!(visible_paths(output.path()), vec!["a.html", "c.txt"]);
    assert_eq!(cached_inputs(output.path()), vec!["a.md", "c.txt"]);

    let page = fs::read_to_string(output.path().join("a.html")).unwrap();
    assert!(page.contains("A, revised"));
}

#[test]
fn rebuild_without_changes_is_a_no_op() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    blog(input.path());
    let options = feed_options();

    build(input.path(), output.path(), &options);
    let before = tree(output.path());

    let again = build(input.path(), output.path(), &options);
    assert_eq!(again.reason, StrategyReason::CacheValid);
    assert_eq!(again.processed(), 0);
    assert_eq!(again.unchanged.len(), 4);
    assert!(again.cleanup.is_empty());
    assert_eq!(tree(output.path()), before);
}

#[test]
fn incremental_result_matches_full_build() {
    let input = TempDir::new().unwrap();
    let incremental = TempDir::new().unwrap();
    let full = TempDir::new().unwrap();
    blog(input.path());
    let options = feed_options();

    build(input.path(), incremental.path(), &options);

    write(input.path(), "posts/second.md", "# Second\n\nRewritten.", T0 + 100);
    write(input.path(), "posts/third.md", "# Third\n\nNew post.", T0 + 200);
    fs::remove_file(input.path().join("img/logo.png")).unwrap();

    let report = build(input.path(), incremental.path(), &options);
    assert_eq!(report.strategy, Strategy::Incremental);
    assert_eq!(report.rendered, vec!["posts/second.md", "posts/third.md"]);

    let full_options = BuildOptions {
        force_full: true,
        ..options
    };
    build(input.path(), full.path(), &full_options);

    assert_eq!(tree(incremental.path()), tree(full.path()));
    assert!(!incremental.path().join("img").exists());
}

#[test]
fn corrupt_cache_falls_back_to_full_build() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    blog(input.path());
    let options = BuildOptions::default();

    build(input.path(), output.path(), &options);
    let expected = tree(output.path());

    fs::write(output.path().join(CACHE_FILENAME), "{ not json").unwrap();
    let report = build(input.path(), output.path(), &options);

    assert_eq!(report.strategy, Strategy::Full);
    assert_eq!(report.reason, StrategyReason::Unreadable);
    assert_eq!(report.processed(), 4);
    assert_eq!(tree(output.path()), expected);
}

#[test]
fn stray_output_files_are_swept_even_without_cache() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write(input.path(), "a.md", "# A", T0);
    write(output.path(), "leftover/old.html", "old", T0);

    let report = build(input.path(), output.path(), &BuildOptions::default());

    assert_eq!(report.reason, StrategyReason::NoCache);
    assert_eq!(report.cleanup.removed, vec!["leftover/old.html"]);
    assert_eq!(visible_paths(output.path()), vec!["a.html"]);
}

#[test]
fn feed_is_kept_only_while_enabled() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    blog(input.path());

    let report = build(input.path(), output.path(), &feed_options());
    assert_eq!(report.feed_items, Some(3));
    let feed = fs::read_to_string(output.path().join("feed.xml")).unwrap();
    assert!(feed.contains("<title>My Blog</title>"));
    assert!(feed.contains("https://blog.example.com/posts/first.html"));

    let report = build(input.path(), output.path(), &BuildOptions::default());
    assert_eq!(report.feed_items, None);
    assert_eq!(report.cleanup.removed, vec!["feed.xml"]);
    assert!(!output.path().join("feed.xml").exists());
}

#[test]
fn advisories_follow_processing_order() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    for i in 0..12 {
        let body = "word ".repeat(200 * (12 - i));
        write(input.path(), &format!("p{i:02}.md"), &format!("# P{i}\n\n{body}"), T0);
    }
    let options = BuildOptions {
        size_threshold: 1,
        ..BuildOptions::default()
    };

    let report = build(input.path(), output.path(), &options);

    let paths: Vec<&str> = report.advisories.iter().map(|a| a.path.as_str()).collect();
    let expected: Vec<String> = (0..12).map(|i| format!("p{i:02}.html")).collect();
    assert_eq!(paths, expected);
    assert!(report.advisories.iter().all(|a| a.over_threshold()));
}

#[test]
fn rendered_pages_link_to_html_outputs() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    blog(input.path());

    build(input.path(), output.path(), &BuildOptions::default());

    let second = fs::read_to_string(output.path().join("posts/second.html")).unwrap();
    assert!(second.contains(r#"href="first.html""#));
    assert!(second.contains("<strong>My Blog</strong>"));
    assert!(!output.path().join("header.html").exists());
}

#[test]
fn asset_replaced_by_directory_rebuilds() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write(input.path(), "x", "asset", T0);
    build(input.path(), output.path(), &BuildOptions::default());

    fs::remove_file(input.path().join("x")).unwrap();
    write(input.path(), "x/y.md", "# Y", T0 + 10);

    let report = build(input.path(), output.path(), &BuildOptions::default());
    assert_eq!(report.rendered, vec!["x/y.md"]);
    assert!(report.cleanup.failed.is_empty());
    assert_eq!(visible_paths(output.path()), vec!["x/y.html"]);

    let fresh = TempDir::new().unwrap();
    build(input.path(), fresh.path(), &BuildOptions::default());
    assert_eq!(tree(output.path()), tree(fresh.path()));
}

#[test]
fn directory_replaced_by_asset_rebuilds() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write(input.path(), "x/y.md", "# Y", T0);
    build(input.path(), output.path(), &BuildOptions::default());

    fs::remove_dir_all(input.path().join("x")).unwrap();
    write(input.path(), "x", "asset", T0 + 10);

    let report = build(input.path(), output.path(), &BuildOptions::default());
    assert_eq!(report.strategy, Strategy::Incremental);
    assert_eq!(report.copied, vec!["x"]);
    assert!(report.cleanup.failed.is_empty());
    assert_eq!(visible_paths(output.path()), vec!["x"]);
    assert_eq!(fs::read_to_string(output.path().join("x")).unwrap(), "asset");

    let full = BuildOptions {
        force_full: true,
        ..BuildOptions::default()
    };
    build(input.path(), output.path(), &full);
    let fresh = TempDir::new().unwrap();
    build(input.path(), fresh.path(), &BuildOptions::default());
    assert_eq!(tree(output.path()), tree(fresh.path()));
}
