//! HTML to Markdown-like text for scraped pages.
//!
//! The page chrome (nav, header, footer, scripts) is dropped, the main content
//! is converted with `htmd`, and a few cleanup passes normalize the result.
//! [`Page::to_document`] renders the artifact body with its frontmatter.

mod cleanup;

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use siteqa_shared::{Result, SiteQaError};

/// Tags whose content never reaches the output.
const SKIPPED_TAGS: [&str; 9] = [
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg",
];

/// Content containers tried in order before falling back to `<body>`.
static CONTENT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["main", "[role=\"main\"]", "article", ".content"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .collect()
});

static BODY_SELECTOR: LazyLock<Option<Selector>> = LazyLock::new(|| Selector::parse("body").ok());
static TITLE_SELECTOR: LazyLock<Option<Selector>> =
    LazyLock::new(|| Selector::parse("title").ok());

static H1_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("h1 regex"));
static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("code block regex"));

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Options for converting one page.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Page URL; relative links are resolved against it.
    pub source_url: Url,
    /// When the page was fetched.
    pub fetched_at: DateTime<Utc>,
}

/// A converted page.
#[derive(Debug, Clone)]
pub struct Page {
    pub source_url: Url,
    pub title: String,
    /// Converted text without frontmatter.
    pub body: String,
    /// Words outside fenced code blocks.
    pub word_count: usize,
    pub fetched_at: DateTime<Utc>,
}

impl Page {
    /// The full artifact text: frontmatter block followed by the body.
    pub fn to_document(&self) -> String {
        format!(
            "---\nsource_url: \"{}\"\ntitle: \"{}\"\nfetched_at: \"{}\"\n---\n\n{}",
            escape_yaml(self.source_url.as_str()),
            escape_yaml(&self.title),
            self.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.body
        )
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// Convert a raw HTML page.
#[instrument(skip(html), fields(url = %opts.source_url))]
pub fn convert(html: &str, opts: &ConvertOptions) -> Result<Page> {
    let doc = Html::parse_document(html);
    let content = extract_content_html(&doc).unwrap_or_else(|| html.to_string());

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIPPED_TAGS.to_vec())
        .build();

    let raw = converter
        .convert(&content)
        .map_err(|e| SiteQaError::Conversion(format!("{}: {e}", opts.source_url)))?;

    let body = cleanup::run_pipeline(&raw, &opts.source_url);

    let title = H1_RE
        .captures(&body)
        .map(|c| c[1].trim().to_string())
        .or_else(|| document_title(&doc))
        .unwrap_or_else(|| "Untitled".to_string());

    let word_count = CODE_BLOCK_RE.replace_all(&body, "").split_whitespace().count();

    debug!(%title, word_count, len = body.len(), "page converted");

    Ok(Page {
        source_url: opts.source_url.clone(),
        title,
        body,
        word_count,
        fetched_at: opts.fetched_at,
    })
}

fn extract_content_html(doc: &Html) -> Option<String> {
    CONTENT_SELECTORS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .or_else(|| {
            BODY_SELECTOR
                .as_ref()
                .and_then(|sel| doc.select(sel).next())
        })
        .map(|el| el.inner_html())
}

fn document_title(doc: &Html) -> Option<String> {
    let sel = TITLE_SELECTOR.as_ref()?;
    let text: String = doc.select(sel).next()?.text().collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn escape_yaml(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
