//! # inkpress
//!
//! An incremental static site generator for trees of Markdown documents.
//! The input directory is mirrored into the output directory: documents are
//! rendered to HTML pages, everything else is copied byte for byte.
//!
//! # Build Pipeline
//!
//! ```text
//! discover   input/   →  FileSet          (walk, classify, map outputs)
//! strategy   .inkpress-cache → Incremental | Full
//! process    FileSet  →  output/          (render or copy, in parallel gzip sizing)
//! reconcile  output/  →  orphans removed, feed.xml, new cache
//! ```
//!
//! A second build with nothing changed writes nothing and leaves a
//! byte-identical output tree and cache behind.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`builder`] | Orchestrates one build: roots, strategy, processing, cleanup, cache |
//! | [`discover`] | Walks the input tree, classifies documents and assets, derives output paths |
//! | [`cache`] | The persisted `path → (mtime, output)` map in the output root |
//! | [`process`] | Renders one document or copies one asset |
//! | [`render`] | Markdown to HTML with front matter, link rewriting and Mermaid blocks |
//! | [`metadata`] | Front matter parsing and the [`metadata::PageMeta`] it produces |
//! | [`template`] | Wraps rendered pages in a built-in or user template |
//! | [`advisory`] | Background gzip sizing of rendered pages |
//! | [`clean`] | Deletes outputs whose input is gone |
//! | [`feed`] | RSS 2.0 `feed.xml` for the documents of the site |
//! | [`config`] | Optional `config.toml` at the input root, merged over stock defaults |
//! | [`serve`] | Local preview server |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Modification Times, Not Hashes
//!
//! A file counts as changed when its mtime differs from the cached one.
//! Reading every input to hash it would cost as much as rebuilding small
//! files. The price is that edits to the header, footer or template are not
//! noticed; pass `--full` after changing them.
//!
//! ## The Cache Is Written Last
//!
//! The old cache is deleted before the first output is touched and the new
//! one is saved only when the build succeeded, so a crash never leaves a
//! cache describing outputs that were not written.
//!
//! ## Maud for Built-in Templates
//!
//! The built-in page templates are [Maud](https://maud.lambda.xyz/) markup,
//! checked at compile time and escaped by default. User templates are loaded
//! at runtime with minijinja.

pub mod advisory;
pub mod builder;
pub mod cache;
pub mod clean;
pub mod config;
pub mod discover;
pub mod feed;
pub mod metadata;
pub mod output;
pub mod process;
pub mod render;
pub mod serve;
pub mod template;

#[cfg(test)]
pub(crate) mod test_helpers;
