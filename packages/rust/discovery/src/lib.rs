//! Sitemap discovery.
//!
//! Before crawling, SiteQA fetches `<base>/sitemap.xml` and collects every
//! `<loc>` it lists. Discovery never fails the caller: an unreachable or
//! malformed sitemap is logged and yields an empty target list, so scraping
//! proceeds with zero items instead of aborting.

mod parser;

use std::collections::HashSet;

use reqwest::Client;
use siteqa_shared::{CrawlTarget, Result, SiteQaError};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use parser::{SITEMAP_NAMESPACE, SitemapDocument, SitemapKind, parse_sitemap};

/// Maximum number of redirects to follow when fetching a sitemap.
const MAX_REDIRECTS: usize = 5;

/// Default timeout in seconds for fetching a sitemap.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum response size we consider valid (50 MB, the protocol limit).
const MAX_RESPONSE_SIZE: u64 = 50 * 1024 * 1024;

/// User-Agent string for discovery requests.
const USER_AGENT: &str = concat!("SiteQA/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Configuration for the discovery process.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
    /// Fetch the children of a `<sitemapindex>` (one level).
    pub follow_index: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            follow_index: true,
        }
    }
}

impl From<&siteqa_shared::AppConfig> for DiscoveryOptions {
    fn from(config: &siteqa_shared::AppConfig) -> Self {
        Self {
            timeout_secs: config.crawl.request_timeout_secs,
            follow_index: config.crawl.follow_sitemap_index,
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Discover crawl targets from `<base_url>/sitemap.xml`.
///
/// Returns targets in sitemap order with duplicates removed. Any network or
/// parse failure is logged and produces an empty list.
#[instrument(skip_all, fields(base_url = %base_url))]
pub async fn discover(base_url: &Url, opts: &DiscoveryOptions) -> Vec<CrawlTarget> {
    match try_discover(base_url, opts).await {
        Ok(targets) => {
            info!(count = targets.len(), "sitemap discovered");
            targets
        }
        Err(e) => {
            warn!(error = %e, "sitemap discovery failed, continuing with no URLs");
            Vec::new()
        }
    }
}

/// The sitemap location for a base URL (`{base}/sitemap.xml`).
pub fn sitemap_url(base_url: &Url) -> String {
    format!("{}/sitemap.xml", base_url.as_str().trim_end_matches('/'))
}

async fn try_discover(base_url: &Url, opts: &DiscoveryOptions) -> Result<Vec<CrawlTarget>> {
    let client = build_client(opts)?;
    let root_url = sitemap_url(base_url);

    info!(sitemap = %root_url, "fetching sitemap");
    let root = fetch_sitemap(&client, &root_url).await?;

    let locs = match root.kind {
        SitemapKind::UrlSet => root.locs,
        SitemapKind::Index if opts.follow_index => collect_index(&client, &root.locs).await,
        SitemapKind::Index => {
            debug!("sitemap index found but following is disabled");
            root.locs
        }
    };

    Ok(into_targets(locs))
}

/// Fetch every child sitemap of an index. Failing children are skipped.
async fn collect_index(client: &Client, children: &[String]) -> Vec<String> {
    let mut locs = Vec::new();

    for child in children {
        match fetch_sitemap(client, child).await {
            Ok(doc) if doc.kind == SitemapKind::UrlSet => {
                debug!(sitemap = %child, count = doc.locs.len(), "child sitemap parsed");
                locs.extend(doc.locs);
            }
            Ok(_) => {
                warn!(sitemap = %child, "nested sitemap index ignored");
            }
            Err(e) => {
                warn!(sitemap = %child, error = %e, "child sitemap skipped");
            }
        }
    }

    locs
}

/// Parse `<loc>` values as absolute URLs, dropping invalid ones and duplicates.
fn into_targets(locs: Vec<String>) -> Vec<CrawlTarget> {
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(locs.len());

    for loc in locs {
        match Url::parse(&loc) {
            Ok(url) => {
                if seen.insert(url.clone()) {
                    targets.push(CrawlTarget::new(url));
                }
            }
            Err(e) => debug!(%loc, error = %e, "skipping invalid <loc>"),
        }
    }

    targets
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a reqwest client with appropriate settings.
fn build_client(opts: &DiscoveryOptions) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(std::time::Duration::from_secs(opts.timeout_secs))
        .build()
        .map_err(|e| SiteQaError::Network(format!("failed to build HTTP client: {e}")))
}

/// Fetch and parse one sitemap document.
pub async fn fetch_sitemap(client: &Client, url: &str) -> Result<SitemapDocument> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SiteQaError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SiteQaError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(SiteQaError::validation(format!(
                "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| SiteQaError::Network(format!("{url}: failed to read body: {e}")))?;

    parse_sitemap(&body).map_err(|e| SiteQaError::parse(format!("{url}: {e}")))
}
