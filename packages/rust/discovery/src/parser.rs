//! Sitemap XML parser.
//!
//! Parses documents following the sitemaps.org 0.9 schema
//! (<https://www.sitemaps.org/protocol.html>):
//! - `<urlset>` roots list page URLs in `<url><loc>…</loc></url>`
//! - `<sitemapindex>` roots list child sitemaps in `<sitemap><loc>…</loc></sitemap>`
//!
//! Only `<loc>` text is consumed. The root element must declare the
//! sitemaps.org namespace, either as the default namespace or under a prefix.

use std::sync::LazyLock;

use regex::Regex;
use siteqa_shared::{Result, SiteQaError};

/// The only namespace accepted on the root element.
pub const SITEMAP_NAMESPACE: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which kind of sitemap document was parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    /// `<urlset>`: `<loc>` entries are pages.
    UrlSet,
    /// `<sitemapindex>`: `<loc>` entries are further sitemaps.
    Index,
}

/// Parsed representation of one sitemap document.
#[derive(Debug, Clone)]
pub struct SitemapDocument {
    /// Root element kind.
    pub kind: SitemapKind,
    /// `<loc>` values in document order.
    pub locs: Vec<String>,
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches XML comments.
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));

/// Matches the root start tag, capturing optional prefix, name and attributes.
static ROOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:([A-Za-z_][\w.-]*):)?(urlset|sitemapindex)\b([^>]*)>").expect("root regex")
});

/// Matches `xmlns="…"` or `xmlns:prefix="…"`.
static XMLNS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"xmlns(?::([A-Za-z_][\w.-]*))?\s*=\s*["']([^"']*)["']"#).expect("xmlns regex")
});

/// Matches `<loc>…</loc>` with an optional namespace prefix.
static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:([A-Za-z_][\w.-]*):)?loc\s*>(.*?)</(?:[A-Za-z_][\w.-]*:)?loc\s*>")
        .expect("loc regex")
});

/// Matches a CDATA section.
static CDATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("cdata regex"));

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a sitemap document into its kind and `<loc>` values.
pub fn parse_sitemap(content: &str) -> Result<SitemapDocument> {
    if content.trim().is_empty() {
        return Err(SiteQaError::parse("sitemap is empty"));
    }

    let content = COMMENT_RE.replace_all(content, "");

    // --- Root element and namespace ---
    let root = ROOT_RE
        .captures(&content)
        .ok_or_else(|| SiteQaError::parse("no <urlset> or <sitemapindex> root element"))?;

    let prefix = root.get(1).map(|m| m.as_str());
    let kind = match &root[2] {
        "urlset" => SitemapKind::UrlSet,
        _ => SitemapKind::Index,
    };

    let declares_namespace = XMLNS_RE.captures_iter(&root[3]).any(|caps| {
        let declared_prefix = caps.get(1).map(|m| m.as_str());
        declared_prefix == prefix && caps[2].trim() == SITEMAP_NAMESPACE
    });

    if !declares_namespace {
        return Err(SiteQaError::parse(format!(
            "root element does not declare the {SITEMAP_NAMESPACE} namespace"
        )));
    }

    // --- <loc> entries (only those in the sitemap namespace) ---
    let locs = LOC_RE
        .captures_iter(&content)
        .filter(|caps| caps.get(1).map(|m| m.as_str()) == prefix)
        .map(|caps| loc_text(&caps[2]))
        .filter(|loc| !loc.is_empty())
        .collect();

    Ok(SitemapDocument { kind, locs })
}

/// Unwrap CDATA, unescape the predefined entities and trim whitespace.
fn loc_text(raw: &str) -> String {
    let text = CDATA_RE.replace_all(raw, "$1");
    unescape_xml(text.trim())
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
