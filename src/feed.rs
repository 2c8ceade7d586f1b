//! RSS 2.0 feed synthesis.
//!
//! When a base URL is configured, every build writes `<output>/feed.xml`
//! with one item per document:
//!
//! ```text
//! title        front-matter title → first heading → "My Post" from my-post.md
//! link, guid   <base_url>/<output path>
//! description  body text after the first heading, cut at a word boundary
//!              to 200 characters (+ "..."); the title if the body is empty
//! pubDate      the document's modification time, RFC 2822
//! ```
//!
//! Items are ordered newest first (ties keep discovery order) and capped at
//! `max_items` (0 keeps all). The channel title and description come from
//! `index.md`, `README.md` or `readme.md` at the input root, falling back to
//! the input directory's name and a stock description.
//!
//! `lastBuildDate` is the newest item's date rather than the wall clock, so
//! rebuilding unchanged inputs produces a byte-identical feed.

use crate::cache::file_mtime;
use crate::discover::{FileKind, output_path};
use crate::metadata::{resolve, title_from_stem};
use crate::render::Renderer;
use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::BytesText;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the feed file in the output root.
pub const FEED_FILENAME: &str = "feed.xml";

const DESCRIPTION_LIMIT: usize = 200;
const CHANNEL_CANDIDATES: &[&str] = &["index.md", "README.md", "readme.md"];
const FALLBACK_SITE_TITLE: &str = "Site Feed";
const FALLBACK_SITE_DESCRIPTION: &str = "Latest posts and updates";

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("failed to encode feed: {0}")]
    Encode(#[source] io::Error),
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// One `<item>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Seconds since the epoch.
    pub published: i64,
}

/// Writes `feed.xml` for a set of documents.
pub struct FeedGenerator<'a> {
    base_url: String,
    max_items: usize,
    renderer: &'a dyn Renderer,
}

impl<'a> FeedGenerator<'a> {
    pub fn new(base_url: &str, max_items: usize, renderer: &'a dyn Renderer) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            max_items,
            renderer,
        }
    }

    /// Write the feed. Returns the number of items written, or `None` when
    /// there was nothing to publish (no file is written then).
    pub fn generate(
        &self,
        documents: &[String],
        input_root: &Path,
        output_root: &Path,
    ) -> Result<Option<usize>, FeedError> {
        let mut items: Vec<FeedItem> = documents
            .iter()
            .filter_map(|rel| self.item_for(rel, input_root))
            .collect();
        if items.is_empty() {
            debug!("no feed items; skipping {FEED_FILENAME}");
            return Ok(None);
        }

        items.sort_by(|a, b| b.published.cmp(&a.published));
        if self.max_items > 0 {
            items.truncate(self.max_items);
        }

        let (title, description) = self.channel_info(input_root);
        let xml = self
            .to_xml(&title, &description, &items)
            .map_err(FeedError::Encode)?;

        let path = output_root.join(FEED_FILENAME);
        fs::write(&path, xml).map_err(|source| FeedError::Write { path, source })?;
        Ok(Some(items.len()))
    }

    fn item_for(&self, rel: &str, input_root: &Path) -> Option<FeedItem> {
        let path = input_root.join(rel);
        let summary = match fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| self.summarize(&bytes).map_err(|e| e.to_string()))
        {
            Ok(summary) => summary,
            Err(e) => {
                warn!("leaving {rel} out of the feed: {e}");
                return None;
            }
        };
        let published = match file_mtime(&path) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!("leaving {rel} out of the feed: {e}");
                return None;
            }
        };

        let title = summary.title.unwrap_or_else(|| title_from_stem(file_stem(rel)));
        let description = if summary.description.is_empty() {
            title.clone()
        } else {
            summary.description
        };
        Some(FeedItem {
            link: format!("{}/{}", self.base_url, output_path(rel, FileKind::Document)),
            title,
            description,
            published,
        })
    }

    fn summarize(&self, source: &[u8]) -> Result<Summary, crate::render::RenderError> {
        let rendered = self.renderer.render(source)?;
        Ok(Summary {
            title: rendered.meta.page_title(),
            description: truncate_words(&body_text(&rendered.html), DESCRIPTION_LIMIT),
        })
    }

    fn channel_info(&self, input_root: &Path) -> (String, String) {
        let summaries: Vec<Summary> = CHANNEL_CANDIDATES
            .iter()
            .filter_map(|name| fs::read(input_root.join(name)).ok())
            .filter_map(|bytes| self.summarize(&bytes).ok())
            .collect();

        let title = summaries
            .iter()
            .find_map(|s| resolve(&[s.title.as_deref()]))
            .unwrap_or_else(|| site_title_from_dir(input_root));
        let description = summaries
            .iter()
            .find(|s| !s.description.is_empty() && Some(&s.description) != s.title.as_ref())
            .map(|s| s.description.clone())
            .unwrap_or_else(|| FALLBACK_SITE_DESCRIPTION.to_string());
        (title, description)
    }

    fn to_xml(&self, title: &str, description: &str, items: &[FeedItem]) -> io::Result<Vec<u8>> {
        let mut buf = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n".to_vec();
        let last_build = items.iter().map(|i| i.published).max().unwrap_or_default();
        {
            let mut writer = Writer::new_with_indent(&mut buf, b' ', 2);
            writer
                .create_element("rss")
                .with_attribute(("version", "2.0"))
                .write_inner_content(|w| -> io::Result<()> {
                    w.create_element("channel")
                        .write_inner_content(|w| -> io::Result<()> {
                            text_element(w, "title", title)?;
                            text_element(w, "link", &self.base_url)?;
                            text_element(w, "description", description)?;
                            text_element(w, "language", "en-gb")?;
                            text_element(w, "lastBuildDate", &rfc2822(last_build))?;
                            for item in items {
                                w.create_element("item").write_inner_content(
                                    |w| -> io::Result<()> {
                                        text_element(w, "title", &item.title)?;
                                        text_element(w, "link", &item.link)?;
                                        text_element(w, "description", &item.description)?;
                                        text_element(w, "pubDate", &rfc2822(item.published))?;
                                        text_element(w, "guid", &item.link)?;
                                        Ok(())
                                    },
                                )?;
                            }
                            Ok(())
                        })?;
                    Ok(())
                })?;
        }
        buf.push(b'\n');
        Ok(buf)
    }
}

struct Summary {
    title: Option<String>,
    description: String,
}

fn text_element<W: io::Write>(w: &mut Writer<W>, name: &str, text: &str) -> io::Result<()> {
    w.create_element(name)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

fn rfc2822(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .to_rfc2822()
}

fn file_stem(rel: &str) -> &str {
    let name = rel.rsplit('/').next().unwrap_or(rel);
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

fn site_title_from_dir(input_root: &Path) -> String {
    let name = input_root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()));
    match name {
        Some(name) if !name.is_empty() => title_from_stem(&name),
        _ => FALLBACK_SITE_TITLE.to_string(),
    }
}

/// Plain text of the body after its first heading, with any further
/// headings dropped and whitespace collapsed.
fn body_text(html: &str) -> String {
    let mut rest = match heading_span(html) {
        Some((_, end)) => &html[end..],
        None => html,
    };
    let mut body = String::with_capacity(rest.len());
    while let Some((start, end)) = heading_span(rest) {
        body.push_str(&rest[..start]);
        body.push('\n');
        rest = &rest[end..];
    }
    body.push_str(rest);

    let text = unescape_html(&strip_html_tags(&body));
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte range of the first `<hN>...</hN>` element.
fn heading_span(html: &str) -> Option<(usize, usize)> {
    let (start, _) = html.match_indices("<h").find(|(i, _)| {
        html[i + 2..].starts_with(|c: char| ('1'..='6').contains(&c))
    })?;
    let close = start + html[start..].find("</h")?;
    let end = close + html[close..].find('>')? + 1;
    Some((start, end))
}

/// Strip HTML tags from a string (simple angle-bracket stripping).
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

fn unescape_html(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Cut `text` to at most `limit` bytes at a word boundary, appending `...`.
fn truncate_words(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut out = String::new();
    for word in text.split_whitespace() {
        let extra = if out.is_empty() { word.len() } else { word.len() + 1 };
        if out.len() + extra > limit {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.push_str("...");
    out
}
