//! Page metadata from front matter.
//!
//! A document may open with a front-matter block:
//!
//! ```text
//! ---                         +++
//! title: Hello                title = "Hello"
//! date: 2024-08-07            date = 2024-08-07
//! tags: [rust, web]           tags = ["rust", "web"]
//! ---                         +++
//! ```
//!
//! `---` blocks are YAML, `+++` blocks are TOML. Both are normalized to a map
//! of JSON values so templates see one shape regardless of the source syntax.
//! The well-known keys (`title`, `date`, `tags`) are lifted into typed fields
//! of [`PageMeta`]; everything else lands in [`PageMeta::extra`].
//!
//! Front matter is advisory. A block that fails to parse is reported to the
//! caller, which logs it and renders the page without metadata.
//!
//! ## Title resolution
//!
//! Each field is resolved independently, first non-empty value wins:
//!
//! - **Page title**: front-matter `title` → first `# heading` → None
//! - **Feed title**: page title → title-cased file stem

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Date formats accepted in front matter, tried in order. Day-first wins
/// over month-first when both would parse.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",  // 2025-08-07
    "%d/%m/%Y",  // 07/08/2025
    "%m/%d/%Y",  // 08/27/2025
    "%d %b %Y",  // 07 Aug 2025
    "%d %B %Y",  // 7 August 2025
    "%B %d, %Y", // August 7, 2025
];

/// Format used for dates shown on pages.
pub const DISPLAY_DATE_FORMAT: &str = "%d %b %Y";

#[derive(Error, Debug)]
pub enum FrontMatterError {
    #[error("YAML front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("TOML front matter: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("front matter must be a table of keys")]
    NotATable,
}

/// Syntax of a front-matter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontMatterFormat {
    /// `---` delimited.
    Yaml,
    /// `+++` delimited.
    Toml,
}

/// Typed metadata for one rendered page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMeta {
    pub title: Option<String>,
    /// Date exactly as written in the front matter.
    pub date: Option<String>,
    pub tags: Vec<String>,
    /// Front-matter keys other than `title`, `date` and `tags`.
    pub extra: BTreeMap<String, Value>,
    /// Text of the first level-one heading in the body.
    pub heading: Option<String>,
    /// Whether the body contains a Mermaid diagram.
    pub has_mermaid: bool,
}

impl PageMeta {
    /// Lift the well-known keys out of a parsed front-matter map.
    pub fn from_front_matter(mut fields: BTreeMap<String, Value>) -> Self {
        let title = fields.remove("title").and_then(scalar_string);
        let date = fields.remove("date").and_then(scalar_string);
        let tags = fields.remove("tags").map(tag_list).unwrap_or_default();
        Self {
            title,
            date,
            tags,
            extra: fields,
            ..Self::default()
        }
    }

    /// Front-matter title, else the first heading.
    pub fn page_title(&self) -> Option<String> {
        resolve(&[self.title.as_deref(), self.heading.as_deref()])
    }

    /// The date normalized to `DD Mon YYYY`, or as written when it matches
    /// no known format.
    pub fn display_date(&self) -> Option<String> {
        self.date.as_deref().map(format_date)
    }
}

/// Return the first non-empty value, trimmed.
///
/// ```text
/// page title: resolve(&[front_matter_title, first_heading])
/// ```
pub fn resolve(sources: &[Option<&str>]) -> Option<String> {
    sources
        .iter()
        .filter_map(|opt| {
            opt.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        })
        .next()
}

/// Parse the body of a front-matter block into a key → value map.
pub fn parse_front_matter(
    format: FrontMatterFormat,
    text: &str,
) -> Result<BTreeMap<String, Value>, FrontMatterError> {
    let value = match format {
        FrontMatterFormat::Yaml => {
            if text.trim().is_empty() {
                return Ok(BTreeMap::new());
            }
            serde_yaml::from_str::<Value>(text)?
        }
        FrontMatterFormat::Toml => toml_to_json(toml::from_str::<toml::Value>(text)?),
    };
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        Value::Null => Ok(BTreeMap::new()),
        _ => Err(FrontMatterError::NotATable),
    }
}

/// Normalize a front-matter date string for display.
pub fn format_date(raw: &str) -> String {
    let trimmed = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.format(DISPLAY_DATE_FORMAT).to_string();
        }
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return datetime.format(DISPLAY_DATE_FORMAT).to_string();
    }
    raw.to_string()
}

/// Turn a file stem into a readable title: `my-first_post` → `My First Post`.
pub fn title_from_stem(stem: &str) -> String {
    stem.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

fn scalar_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tags may be a list or a single comma-separated string.
fn tag_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(scalar_string)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // =========================================================================
    // resolve
    // =========================================================================

    #[test]
    fn resolve_first_non_empty_wins() {
        assert_eq!(
            resolve(&[None, Some("  "), Some(" Heading ")]),
            Some("Heading".to_string())
        );
        assert_eq!(resolve(&[None, None]), None);
    }

    // =========================================================================
    // Front matter parsing
    // =========================================================================

    #[test]
    fn yaml_front_matter() {
        let fields = parse_front_matter(
            FrontMatterFormat::Yaml,
            "title: Hello\ndate: 2024-08-07\ntags: [rust, web]\nauthor: Sam\n",
        )
        .unwrap();
        let meta = PageMeta::from_front_matter(fields);

        assert_eq!(meta.title.as_deref(), Some("Hello"));
        assert_eq!(meta.date.as_deref(), Some("2024-08-07"));
        assert_eq!(meta.tags, vec!["rust", "web"]);
        assert_eq!(meta.extra.get("author"), Some(&json!("Sam")));
        assert!(!meta.extra.contains_key("title"));
    }

    #[test]
    fn toml_front_matter_with_native_date() {
        let fields = parse_front_matter(
            FrontMatterFormat::Toml,
            "title = \"Hello\"\ndate = 2024-08-07\ndraft = true\n",
        )
        .unwrap();
        let meta = PageMeta::from_front_matter(fields);

        assert_eq!(meta.title.as_deref(), Some("Hello"));
        assert_eq!(meta.date.as_deref(), Some("2024-08-07"));
        assert_eq!(meta.extra.get("draft"), Some(&json!(true)));
    }

    #[test]
    fn comma_separated_tags() {
        let fields =
            parse_front_matter(FrontMatterFormat::Yaml, "tags: \"a, b ,, c\"").unwrap();
        assert_eq!(PageMeta::from_front_matter(fields).tags, vec!["a", "b", "c"]);
    }

    #[test]
    fn invalid_yaml_is_error() {
        let result = parse_front_matter(FrontMatterFormat::Yaml, "title: [unclosed");
        assert!(matches!(result, Err(FrontMatterError::Yaml(_))));
    }

    #[test]
    fn scalar_yaml_is_not_a_table() {
        let result = parse_front_matter(FrontMatterFormat::Yaml, "just a string");
        assert!(matches!(result, Err(FrontMatterError::NotATable)));
    }

    #[test]
    fn empty_block_is_empty_map() {
        assert!(
            parse_front_matter(FrontMatterFormat::Yaml, "")
                .unwrap()
                .is_empty()
        );
        assert!(
            parse_front_matter(FrontMatterFormat::Toml, "")
                .unwrap()
                .is_empty()
        );
    }

    // =========================================================================
    // Titles and dates
    // =========================================================================

    #[test]
    fn page_title_prefers_front_matter() {
        let meta = PageMeta {
            title: Some("From FM".into()),
            heading: Some("From Heading".into()),
            ..PageMeta::default()
        };
        assert_eq!(meta.page_title().as_deref(), Some("From FM"));

        let meta = PageMeta {
            heading: Some("From Heading".into()),
            ..PageMeta::default()
        };
        assert_eq!(meta.page_title().as_deref(), Some("From Heading"));
    }

    #[test]
    fn date_formats_normalize() {
        assert_eq!(format_date("2025-08-07"), "07 Aug 2025");
        assert_eq!(format_date("07/08/2025"), "07 Aug 2025");
        assert_eq!(format_date("08/27/2025"), "27 Aug 2025");
        assert_eq!(format_date("07 Aug 2025"), "07 Aug 2025");
        assert_eq!(format_date("7 August 2025"), "07 Aug 2025");
        assert_eq!(format_date("August 7, 2025"), "07 Aug 2025");
        assert_eq!(format_date("2025-08-07T10:30:00Z"), "07 Aug 2025");
    }

    #[test]
    fn ambiguous_date_reads_day_first() {
        assert_eq!(format_date("03/04/2025"), "03 Apr 2025");
    }

    #[test]
    fn unparseable_date_is_kept() {
        assert_eq!(format_date("sometime in spring"), "sometime in spring");
    }

    #[test]
    fn title_from_stem_capitalizes_words() {
        assert_eq!(title_from_stem("my-first_post"), "My First Post");
        assert_eq!(title_from_stem("index"), "Index");
        assert_eq!(title_from_stem("--"), "");
    }
}
