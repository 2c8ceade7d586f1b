//! Page templates.
//!
//! Rendered Markdown is only a body fragment; a template wraps it into a full
//! HTML page together with the optional header and footer partials.
//!
//! ## Selecting a template
//!
//! The selector (`--template`, or `template.name` in `config.toml`) is
//! resolved once, when the [`Templater`] is built:
//!
//! | Selector                         | Template                           |
//! |----------------------------------|------------------------------------|
//! | path to an existing file         | file template                      |
//! | absolute path, or ends in `.html`| file template (warns if missing)   |
//! | `default`, `minimal`             | built-in                           |
//! | anything else                    | none; pages are the raw fragment   |
//!
//! Built-ins are [maud](https://maud.lambda.xyz/) markup compiled into the
//! binary. File templates are [minijinja](https://docs.rs/minijinja)
//! templates with HTML auto-escaping and these variables:
//!
//! ```text
//! content   rendered body (already HTML, not escaped)
//! header    rendered header partial, or empty
//! footer    rendered footer partial, or empty
//! title     front-matter title, else the first heading
//! date      front-matter date as "07 Aug 2025"
//! tags      list of strings
//! meta      every front-matter key, including custom ones
//! ```
//!
//! A template that cannot be loaded or fails to render never fails the
//! build: the page falls back to the raw body fragment and a warning is
//! logged.

use crate::metadata::PageMeta;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use minijinja::{Environment, Value, context};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

const CSS: &str = include_str!("../static/style.css");
const MERMAID_SRC: &str = "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js";
const FILE_TEMPLATE_NAME: &str = "page.html";

/// Templates shipped inside the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// Styled page with header, footer, date and tags.
    Default,
    /// Bare HTML5 shell around the content.
    Minimal,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::Default),
            "minimal" => Some(Self::Minimal),
            _ => None,
        }
    }
}

enum Kind {
    Builtin(Builtin),
    File(Environment<'static>),
    Raw,
}

/// Wraps rendered bodies into full pages.
pub struct Templater {
    kind: Kind,
}

impl std::fmt::Debug for Templater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.kind {
            Kind::Builtin(b) => format!("Builtin({b:?})"),
            Kind::File(_) => "File".to_string(),
            Kind::Raw => "Raw".to_string(),
        };
        f.debug_struct("Templater").field("kind", &kind).finish()
    }
}

impl Templater {
    /// Resolve a template selector. Never fails; unusable selectors produce
    /// a templater that returns the body unchanged.
    pub fn resolve(selector: &str) -> Self {
        let path = Path::new(selector);
        let is_file = path.is_file()
            || path.is_absolute()
            || path.extension().is_some_and(|ext| ext == "html");

        let kind = if is_file {
            match load_file_template(path) {
                Ok(env) => Kind::File(env),
                Err(e) => {
                    warn!("template {selector}: {e}; writing pages without a template");
                    Kind::Raw
                }
            }
        } else {
            match Builtin::from_name(selector) {
                Some(builtin) => Kind::Builtin(builtin),
                None => {
                    warn!("unknown template {selector:?}; writing pages without a template");
                    Kind::Raw
                }
            }
        };
        Self { kind }
    }

    /// A templater that returns the body unchanged.
    pub fn raw() -> Self {
        Self { kind: Kind::Raw }
    }

    pub fn builtin(builtin: Builtin) -> Self {
        Self {
            kind: Kind::Builtin(builtin),
        }
    }

    /// Wrap `html` into a page.
    pub fn apply(
        &self,
        html: &str,
        header: Option<&str>,
        footer: Option<&str>,
        meta: &PageMeta,
    ) -> String {
        match &self.kind {
            Kind::Raw => html.to_string(),
            Kind::Builtin(Builtin::Default) => {
                default_page(html, header, footer, meta).into_string()
            }
            Kind::Builtin(Builtin::Minimal) => {
                minimal_page(html, header, footer, meta).into_string()
            }
            Kind::File(env) => match render_file_template(env, html, header, footer, meta) {
                Ok(page) => page,
                Err(e) => {
                    warn!("template render failed: {e}; writing page without a template");
                    html.to_string()
                }
            },
        }
    }
}

fn load_file_template(path: &Path) -> Result<Environment<'static>, String> {
    let source = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let mut env = Environment::new();
    env.add_template_owned(FILE_TEMPLATE_NAME, source)
        .map_err(|e| e.to_string())?;
    Ok(env)
}

fn render_file_template(
    env: &Environment<'static>,
    html: &str,
    header: Option<&str>,
    footer: Option<&str>,
    meta: &PageMeta,
) -> Result<String, minijinja::Error> {
    let mut all_meta: BTreeMap<String, serde_json::Value> = meta.extra.clone();
    if let Some(title) = &meta.title {
        all_meta.insert("title".into(), title.clone().into());
    }
    if let Some(date) = &meta.date {
        all_meta.insert("date".into(), date.clone().into());
    }
    if !meta.tags.is_empty() {
        all_meta.insert("tags".into(), meta.tags.clone().into());
    }

    env.get_template(FILE_TEMPLATE_NAME)?.render(context! {
        content => Value::from_safe_string(html.to_string()),
        header => Value::from_safe_string(header.unwrap_or_default().to_string()),
        footer => Value::from_safe_string(footer.unwrap_or_default().to_string()),
        title => meta.page_title().unwrap_or_default(),
        date => meta.display_date().unwrap_or_default(),
        tags => meta.tags.clone(),
        meta => Value::from_serialize(&all_meta),
        has_mermaid => meta.has_mermaid,
    })
}

// ============================================================================
// Built-in templates
// ============================================================================

fn base_document(title: &str, css: Option<&str>, mermaid: bool, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                @if let Some(css) = css {
                    style { (PreEscaped(css)) }
                }
            }
            body {
                (content)
                @if mermaid {
                    script src=(MERMAID_SRC) {}
                    script { "mermaid.initialize({ startOnLoad: true });" }
                }
            }
        }
    }
}

fn default_page(
    body: &str,
    header: Option<&str>,
    footer: Option<&str>,
    meta: &PageMeta,
) -> Markup {
    let title = meta.page_title().unwrap_or_default();
    let date = meta.display_date();
    let content = html! {
        @if let Some(header) = header {
            header.site-header { (PreEscaped(header)) }
        }
        main {
            @if date.is_some() || !meta.tags.is_empty() {
                p.page-meta {
                    @if let Some(date) = &date {
                        time { (date) }
                    }
                    @for tag in &meta.tags {
                        span.tag { "#" (tag) }
                    }
                }
            }
            article { (PreEscaped(body)) }
        }
        @if let Some(footer) = footer {
            footer.site-footer { (PreEscaped(footer)) }
        }
    };
    base_document(&title, Some(CSS), meta.has_mermaid, content)
}

fn minimal_page(
    body: &str,
    header: Option<&str>,
    footer: Option<&str>,
    meta: &PageMeta,
) -> Markup {
    let title = meta.page_title().unwrap_or_default();
    let content = html! {
        @if let Some(header) = header { (PreEscaped(header)) }
        (PreEscaped(body))
        @if let Some(footer) = footer { (PreEscaped(footer)) }
    };
    base_document(&title, None, meta.has_mermaid, content)
}
