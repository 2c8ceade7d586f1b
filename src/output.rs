//! CLI output formatting.
//!
//! # Output Format
//!
//! ## Build progress
//!
//! ```text
//! ==> Full build of 4 files (no build cache)
//!     rendered  posts/hello.md → posts/hello.html
//!     copied    img/logo.png
//!     unchanged about.md
//!     removed   old.html
//!     feed      feed.xml (3 items)
//! ```
//!
//! ## Size advisories
//!
//! ```text
//! Page sizes (gzip)
//!     index.html                 3.2 KB
//!     posts/long.html           18.9 KB  over 14.0 KB
//! ```
//!
//! ## Summary
//!
//! ```text
//! Built 2 pages, copied 1 asset, 1 unchanged, removed 1 orphan
//! ```
//!
//! # Architecture
//!
//! Each block has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::advisory::SizeAdvisory;
use crate::builder::{BuildEvent, BuildReport};

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page`, `2 pages`.
fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

fn kilobytes(bytes: usize) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

/// Capitalize the first letter of `text`.
fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ============================================================================
// Build progress
// ============================================================================

/// Format one build event as output lines.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    let line = match event {
        BuildEvent::StrategyChosen {
            strategy,
            reason,
            files,
        } => {
            return vec![format!(
                "==> {} build of {} ({})",
                capitalize(&strategy.to_string()),
                plural(*files, "file", "files"),
                reason
            )];
        }
        BuildEvent::Rendered { input, output } => format!("rendered  {input} → {output}"),
        BuildEvent::Copied { input, output } if input == output => format!("copied    {input}"),
        BuildEvent::Copied { input, output } => format!("copied    {input} → {output}"),
        BuildEvent::Unchanged { input } => format!("unchanged {input}"),
        BuildEvent::Removed { output } => format!("removed   {output}"),
        BuildEvent::FeedWritten { items } => {
            format!(
                "feed      {} ({})",
                crate::feed::FEED_FILENAME,
                plural(*items, "item", "items")
            )
        }
    };
    vec![format!("{}{}", indent(1), line)]
}

pub fn print_build_event(event: &BuildEvent) {
    for line in format_build_event(event) {
        println!("{}", line);
    }
}

// ============================================================================
// Size advisories
// ============================================================================

/// Format the page-size table. Empty when there is nothing to report.
pub fn format_advisories(advisories: &[SizeAdvisory]) -> Vec<String> {
    if advisories.is_empty() {
        return Vec::new();
    }
    let width = advisories.iter().map(|a| a.path.len()).max().unwrap_or(0);

    let mut lines = vec!["Page sizes (gzip)".to_string()];
    for advisory in advisories {
        let mut line = format!(
            "{}{:<width$}  {:>8}",
            indent(1),
            advisory.path,
            kilobytes(advisory.compressed_bytes),
        );
        if advisory.over_threshold() {
            line.push_str(&format!("  over {}", kilobytes(advisory.threshold)));
        }
        lines.push(line);
    }
    lines
}

pub fn print_advisories(advisories: &[SizeAdvisory]) {
    for line in format_advisories(advisories) {
        println!("{}", line);
    }
}

// ============================================================================
// Summary
// ============================================================================

/// One-line build summary.
pub fn format_summary(report: &BuildReport) -> String {
    let mut parts = vec![
        format!("Built {}", plural(report.rendered.len(), "page", "pages")),
        format!("copied {}", plural(report.copied.len(), "asset", "assets")),
    ];
    if !report.unchanged.is_empty() {
        parts.push(format!("{} unchanged", report.unchanged.len()));
    }
    if !report.cleanup.removed.is_empty() {
        parts.push(format!(
            "removed {}",
            plural(report.cleanup.removed.len(), "orphan", "orphans")
        ));
    }
    if !report.cleanup.failed.is_empty() {
        parts.push(format!(
            "{} could not be removed",
            report.cleanup.failed.len()
        ));
    }
    parts.join(", ")
}

pub fn print_summary(report: &BuildReport) {
    println!("{}", format_summary(report));
}
