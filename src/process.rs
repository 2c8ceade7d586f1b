//! Per-file artifact processing.
//!
//! The build engine decides *whether* a file needs work; this module does
//! the work for one file:
//!
//! - **Documents**: read → render ([`Renderer`]) → wrap ([`Templater`]) →
//!   write `<output>/<rel>.html` → queue the page for the size advisory.
//! - **Assets**: copy byte for byte to the mirrored path.
//!
//! Parent directories are created as needed, and stale outputs left in
//! their way by an earlier shape of the input tree are removed. Every error names the
//! input-relative path and the step that failed, so a failed build points at
//! the offending file.

use crate::advisory::{AdvisoryCollector, SizeAdvisory};
use crate::render::{RenderError, Renderer};
use crate::template::Templater;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: io::Error },
    #[error("failed to render {path}: {source}")]
    Render { path: String, source: RenderError },
    #[error("failed to create output directory for {path}: {source}")]
    CreateDir { path: String, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: String, source: io::Error },
    #[error("failed to copy {path}: {source}")]
    Copy { path: String, source: io::Error },
    #[error("failed to remove stale output in the way of {path}: {source}")]
    Obstructed { path: String, source: io::Error },
    #[error("failed to stat {path}: {source}")]
    Stat { path: String, source: io::Error },
}

/// Everything a page needs besides its own source.
pub struct PageContext<'a> {
    pub renderer: &'a dyn Renderer,
    pub templater: &'a Templater,
    /// Rendered header partial.
    pub header: Option<&'a str>,
    /// Rendered footer partial.
    pub footer: Option<&'a str>,
}

/// Turns input files into output files for one build.
pub struct ArtifactProcessor<'a> {
    input_root: &'a Path,
    output_root: &'a Path,
    page: PageContext<'a>,
    advisories: AdvisoryCollector,
}

impl<'a> ArtifactProcessor<'a> {
    pub fn new(
        input_root: &'a Path,
        output_root: &'a Path,
        page: PageContext<'a>,
        size_threshold: usize,
    ) -> Self {
        Self {
            input_root,
            output_root,
            page,
            advisories: AdvisoryCollector::new(size_threshold),
        }
    }

    /// Render `rel_input` into `rel_output`. Returns the bytes written.
    pub fn process_document(
        &mut self,
        rel_input: &str,
        rel_output: &str,
    ) -> Result<usize, ProcessError> {
        let source = fs::read(self.input_root.join(rel_input)).map_err(|source| {
            ProcessError::Read {
                path: rel_input.to_string(),
                source,
            }
        })?;
        let rendered = self
            .page
            .renderer
            .render(&source)
            .map_err(|source| ProcessError::Render {
                path: rel_input.to_string(),
                source,
            })?;
        let page = self.page.templater.apply(
            &rendered.html,
            self.page.header,
            self.page.footer,
            &rendered.meta,
        );

        let dest = prepare_dest(self.output_root, rel_output, rel_input)?;
        fs::write(&dest, &page).map_err(|source| ProcessError::Write {
            path: rel_input.to_string(),
            source,
        })?;

        let written = page.len();
        self.advisories.submit(rel_output, page.into_bytes());
        Ok(written)
    }

    /// Copy `rel_input` verbatim to `rel_output`. Returns the bytes copied.
    pub fn process_asset(&self, rel_input: &str, rel_output: &str) -> Result<u64, ProcessError> {
        let dest = prepare_dest(self.output_root, rel_output, rel_input)?;
        fs::copy(self.input_root.join(rel_input), &dest).map_err(|source| ProcessError::Copy {
            path: rel_input.to_string(),
            source,
        })
    }

    /// Wait for outstanding size measurements, in processing order.
    pub fn finish(self) -> Vec<SizeAdvisory> {
        self.advisories.drain()
    }
}

/// Make room for `<output_root>/<rel_output>` and return its path.
///
/// The output tree may still hold the previous shape of the input tree: a
/// file where a parent directory must now go, or a directory where the file
/// itself must go. Neither can be an output of the current build, so both
/// are removed before the write.
fn prepare_dest(
    output_root: &Path,
    rel_output: &str,
    rel_input: &str,
) -> Result<PathBuf, ProcessError> {
    let obstructed = |source| ProcessError::Obstructed {
        path: rel_input.to_string(),
        source,
    };
    let dest = output_root.join(rel_output);

    let mut ancestor = output_root.to_path_buf();
    let parents = rel_output.split('/').collect::<Vec<_>>();
    for part in &parents[..parents.len().saturating_sub(1)] {
        ancestor.push(part);
        match fs::metadata(&ancestor) {
            Ok(meta) if meta.is_dir() => continue,
            Ok(_) => {
                debug!("removing stale file {} in the way of {rel_output}", ancestor.display());
                fs::remove_file(&ancestor).map_err(obstructed)?;
                break;
            }
            Err(_) => break,
        }
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| ProcessError::CreateDir {
            path: rel_input.to_string(),
            source,
        })?;
    }

    if fs::symlink_metadata(&dest).is_ok_and(|meta| meta.is_dir()) {
        debug!("removing stale directory {rel_output}");
        fs::remove_dir_all(&dest).map_err(obstructed)?;
    }
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{MarkdownRenderer, Rendered};
    use crate::test_helpers::{site_fixture, write_file};
    use tempfile::TempDir;

    /// Renderer that always fails, to exercise error paths.
    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn render(&self, _source: &[u8]) -> Result<Rendered, RenderError> {
            Err(RenderError::Failed("boom".into()))
        }
    }

    fn raw_context<'a>(renderer: &'a dyn Renderer, templater: &'a Templater) -> PageContext<'a> {
        PageContext {
            renderer,
            templater,
            header: None,
            footer: None,
        }
    }

    #[test]
    fn document_is_rendered_into_nested_output() {
        let input = site_fixture(&[("posts/hello.md", "# Hello\n\n[next](b.md)\n")]);
        let output = TempDir::new().unwrap();
        let renderer = MarkdownRenderer::default();
        let templater = Templater::raw();

        let mut processor =
            ArtifactProcessor::new(input.path(), output.path(), raw_context(&renderer, &templater), 0);
        processor
            .process_document("posts/hello.md", "posts/hello.html")
            .unwrap();

        let html = fs::read_to_string(output.path().join("posts/hello.html")).unwrap();
        assert!(html.contains("<h1>Hello</h1>"));
        assert!(html.contains("href=\"b.html\""));
        assert!(processor.finish().is_empty());
    }

    #[test]
    fn header_and_footer_reach_the_template() {
        let input = site_fixture(&[("a.md", "body")]);
        let output = TempDir::new().unwrap();
        let renderer = MarkdownRenderer::default();
        let templater = Templater::resolve("minimal");
        let page = PageContext {
            renderer: &renderer,
            templater: &templater,
            header: Some("<p>HEAD</p>"),
            footer: Some("<p>FOOT</p>"),
        };

        let mut processor = ArtifactProcessor::new(input.path(), output.path(), page, 0);
        processor.process_document("a.md", "a.html").unwrap();

        let html = fs::read_to_string(output.path().join("a.html")).unwrap();
        let head = html.find("HEAD").unwrap();
        let body = html.find("body</p>").unwrap();
        let foot = html.find("FOOT").unwrap();
        assert!(head < body && body < foot);
    }

    #[test]
    fn documents_are_measured_in_order() {
        let input = site_fixture(&[("a.md", "# A"), ("b.md", "# B")]);
        let output = TempDir::new().unwrap();
        let renderer = MarkdownRenderer::default();
        let templater = Templater::raw();

        let mut processor = ArtifactProcessor::new(
            input.path(),
            output.path(),
            raw_context(&renderer, &templater),
            1024,
        );
        processor.process_document("b.md", "b.html").unwrap();
        processor.process_document("a.md", "a.html").unwrap();
        processor.process_asset("a.md", "copy.md").unwrap();

        let paths: Vec<_> = processor.finish().into_iter().map(|a| a.path).collect();
        assert_eq!(paths, vec!["b.html", "a.html"]);
    }

    #[test]
    fn asset_is_copied_verbatim() {
        let input = TempDir::new().unwrap();
        let bytes: Vec<u8> = (0..=255).collect();
        fs::create_dir_all(input.path().join("img")).unwrap();
        fs::write(input.path().join("img/raw.bin"), &bytes).unwrap();
        let output = TempDir::new().unwrap();
        let renderer = MarkdownRenderer::default();
        let templater = Templater::raw();

        let processor =
            ArtifactProcessor::new(input.path(), output.path(), raw_context(&renderer, &templater), 0);
        let copied = processor.process_asset("img/raw.bin", "img/raw.bin").unwrap();

        assert_eq!(copied, 256);
        assert_eq!(fs::read(output.path().join("img/raw.bin")).unwrap(), bytes);
    }

    #[test]
    fn missing_document_is_read_error() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let renderer = MarkdownRenderer::default();
        let templater = Templater::raw();

        let mut processor =
            ArtifactProcessor::new(input.path(), output.path(), raw_context(&renderer, &templater), 0);
        let err = processor.process_document("gone.md", "gone.html").unwrap_err();

        assert!(matches!(&err, ProcessError::Read { path, .. } if path == "gone.md"));
        assert!(err.to_string().contains("gone.md"));
    }

    #[test]
    fn render_failure_names_the_file() {
        let input = site_fixture(&[("bad.md", "x")]);
        let output = TempDir::new().unwrap();
        let templater = Templater::raw();

        let mut processor = ArtifactProcessor::new(
            input.path(),
            output.path(),
            raw_context(&FailingRenderer, &templater),
            0,
        );
        let err = processor.process_document("bad.md", "bad.html").unwrap_err();

        assert!(matches!(err, ProcessError::Render { ref path, .. } if path == "bad.md"));
        assert!(!output.path().join("bad.html").exists());
    }

    #[test]
    fn stale_file_in_place_of_directory_is_replaced() {
        let input = site_fixture(&[("x/y.md", "# Y"), ("x/z/a.txt", "a")]);
        let output = TempDir::new().unwrap();
        // `x` used to be an asset file.
        write_file(output.path(), "x", "old asset");
        let renderer = MarkdownRenderer::default();
        let templater = Templater::raw();

        let mut processor =
            ArtifactProcessor::new(input.path(), output.path(), raw_context(&renderer, &templater), 0);
        processor.process_document("x/y.md", "x/y.html").unwrap();
        processor.process_asset("x/z/a.txt", "x/z/a.txt").unwrap();

        assert!(output.path().join("x").is_dir());
        assert!(output.path().join("x/y.html").is_file());
        assert_eq!(fs::read_to_string(output.path().join("x/z/a.txt")).unwrap(), "a");
    }

    #[test]
    fn stale_directory_in_place_of_file_is_replaced() {
        let input = site_fixture(&[("x", "now a file"), ("page.md", "# Page")]);
        let output = TempDir::new().unwrap();
        write_file(output.path(), "x/y.html", "old page");
        write_file(output.path(), "page.html/inner.txt", "old");
        let renderer = MarkdownRenderer::default();
        let templater = Templater::raw();

        let mut processor =
            ArtifactProcessor::new(input.path(), output.path(), raw_context(&renderer, &templater), 0);
        processor.process_asset("x", "x").unwrap();
        processor.process_document("page.md", "page.html").unwrap();

        assert_eq!(fs::read_to_string(output.path().join("x")).unwrap(), "now a file");
        assert!(output.path().join("page.html").is_file());
    }
}
