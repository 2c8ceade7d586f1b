//! Markdown rendering.
//!
//! [`Renderer`] is the seam between the build engine and the Markdown
//! dialect. The stock [`MarkdownRenderer`] uses pulldown-cmark with GitHub
//! style extensions (tables, footnotes, strikethrough, task lists) and does
//! three rewrites on the event stream before emitting HTML:
//!
//! - **Front matter**: a leading `---` (YAML) or `+++` (TOML) block is
//!   lifted into [`PageMeta`] instead of being rendered.
//! - **Links**: relative links to other documents (`[next](part-2.md#top)`)
//!   point at the rendered page (`part-2.html#top`).
//! - **Mermaid**: a ```` ```mermaid ```` fence becomes
//!   `<pre class="mermaid">` so the Mermaid script can pick it up.
//!
//! Raw HTML in the source passes through untouched.

use crate::discover::HTML_EXTENSION;
use crate::metadata::{self, FrontMatterFormat, PageMeta};
use maud::html;
use pulldown_cmark::{
    CodeBlockKind, CowStr, Event, HeadingLevel, MetadataBlockKind, Options, Parser, Tag, TagEnd,
    html as md_html,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("document is not valid UTF-8: {0}")]
    NonUtf8(#[from] std::str::Utf8Error),
    #[error("{0}")]
    Failed(String),
}

/// Rendered body HTML plus the metadata found while rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rendered {
    pub html: String,
    pub meta: PageMeta,
}

/// Converts a document's source bytes into an HTML fragment.
pub trait Renderer: Send + Sync {
    fn render(&self, source: &[u8]) -> Result<Rendered, RenderError>;
}

/// pulldown-cmark backed renderer.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    document_extensions: Vec<String>,
}

impl MarkdownRenderer {
    /// `document_extensions` decides which link targets are rewritten to
    /// `.html`.
    pub fn new(document_extensions: Vec<String>) -> Self {
        Self {
            document_extensions,
        }
    }

    fn options() -> Options {
        Options::ENABLE_TABLES
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_YAML_STYLE_METADATA_BLOCKS
            | Options::ENABLE_PLUSES_DELIMITED_METADATA_BLOCKS
    }
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new(vec!["md".to_string(), "markdown".to_string()])
    }
}

/// What the event filter is currently inside of.
enum Capture {
    None,
    FrontMatter(FrontMatterFormat, String),
    Heading(String),
    Mermaid(String),
}

impl Renderer for MarkdownRenderer {
    fn render(&self, source: &[u8]) -> Result<Rendered, RenderError> {
        let text = std::str::from_utf8(source)?;

        let mut front_matter: Option<BTreeMap<String, serde_json::Value>> = None;
        let mut heading: Option<String> = None;
        let mut has_mermaid = false;
        let mut state = Capture::None;
        let mut events: Vec<Event> = Vec::new();

        for event in Parser::new_ext(text, Self::options()) {
            state = match (state, event) {
                (Capture::None, Event::Start(Tag::MetadataBlock(kind))) => {
                    let format = match kind {
                        MetadataBlockKind::YamlStyle => FrontMatterFormat::Yaml,
                        MetadataBlockKind::PlusesStyle => FrontMatterFormat::Toml,
                    };
                    Capture::FrontMatter(format, String::new())
                }
                (Capture::FrontMatter(format, mut buf), Event::Text(t)) => {
                    buf.push_str(&t);
                    Capture::FrontMatter(format, buf)
                }
                (Capture::FrontMatter(format, buf), Event::End(TagEnd::MetadataBlock(_))) => {
                    match metadata::parse_front_matter(format, &buf) {
                        Ok(fields) => front_matter = Some(fields),
                        Err(e) => warn!("ignoring invalid front matter: {e}"),
                    }
                    Capture::None
                }
                (state @ Capture::FrontMatter(..), _) => state,

                (Capture::None, Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))))
                    if is_mermaid(&info) =>
                {
                    Capture::Mermaid(String::new())
                }
                (Capture::Mermaid(mut buf), Event::Text(t)) => {
                    buf.push_str(&t);
                    Capture::Mermaid(buf)
                }
                (Capture::Mermaid(buf), Event::End(TagEnd::CodeBlock)) => {
                    let diagram = html! { pre class="mermaid" { (buf) } };
                    events.push(Event::Html(CowStr::from(diagram.into_string())));
                    has_mermaid = true;
                    Capture::None
                }
                (state @ Capture::Mermaid(_), _) => state,

                (Capture::None, event @ Event::Start(Tag::Heading { level: HeadingLevel::H1, .. }))
                    if heading.is_none() =>
                {
                    events.push(event);
                    Capture::Heading(String::new())
                }
                (Capture::Heading(buf), event @ Event::End(TagEnd::Heading(_))) => {
                    heading = Some(buf.trim().to_string());
                    events.push(event);
                    Capture::None
                }

                (
                    state,
                    Event::Start(Tag::Link {
                        link_type,
                        dest_url,
                        title,
                        id,
                    }),
                ) => {
                    let dest_url = match rewrite_link(&dest_url, &self.document_extensions) {
                        Some(rewritten) => CowStr::from(rewritten),
                        None => dest_url,
                    };
                    events.push(Event::Start(Tag::Link {
                        link_type,
                        dest_url,
                        title,
                        id,
                    }));
                    state
                }

                (mut state, event) => {
                    if let Capture::Heading(buf) = &mut state {
                        if let Event::Text(t) | Event::Code(t) = &event {
                            buf.push_str(t);
                        }
                    }
                    events.push(event);
                    state
                }
            };
        }

        let mut html = String::with_capacity(text.len() * 3 / 2);
        md_html::push_html(&mut html, events.into_iter());

        let mut meta = front_matter
            .map(PageMeta::from_front_matter)
            .unwrap_or_default();
        meta.heading = heading.filter(|h| !h.is_empty());
        meta.has_mermaid = has_mermaid;

        Ok(Rendered { html, meta })
    }
}

fn is_mermaid(info: &str) -> bool {
    info.split_whitespace().next() == Some("mermaid")
}

/// Point a link at the rendered page when it targets a local document.
///
/// Returns `None` when the destination should be left alone: it has a URL
/// scheme, is a bare fragment, or does not end in a document extension.
pub fn rewrite_link(dest: &str, document_extensions: &[String]) -> Option<String> {
    if dest.starts_with('#') || dest.starts_with("//") || has_scheme(dest) {
        return None;
    }
    let split = dest.find(['?', '#']).unwrap_or(dest.len());
    let (path, suffix) = dest.split_at(split);

    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || !document_extensions.iter().any(|e| e == ext) {
        return None;
    }
    let base = &path[..path.len() - ext.len()];
    Some(format!("{base}{HTML_EXTENSION}{suffix}"))
}

/// `scheme:` prefix per RFC 3986 (`https:`, `mailto:`, `tel:` ...).
fn has_scheme(dest: &str) -> bool {
    let Some((scheme, _)) = dest.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
