//! Crawl backend: fetch one URL, report success and the raw page payload.

use std::net::IpAddr;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use tracing::debug;
use url::Url;

use siteqa_shared::{CrawlConfig, Result, SiteQaError};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("SiteQA/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects followed per page.
const MAX_REDIRECTS: usize = 5;

/// Whether the backend may serve a cached copy of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Enabled,
    Bypass,
}

/// What the backend returned for one URL.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The backend considers the fetch successful.
    pub success: bool,
    /// Raw page payload (HTML).
    pub html: String,
    /// HTTP status, when the backend speaks HTTP.
    pub status_code: Option<u16>,
    /// Backend-provided reason when `success` is false.
    pub error_message: Option<String>,
}

impl FetchedPage {
    /// A successful fetch with the given payload.
    pub fn ok(html: impl Into<String>) -> Self {
        Self {
            success: true,
            html: html.into(),
            status_code: Some(200),
            error_message: None,
        }
    }

    /// A fetch the backend reports as failed.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            html: String::new(),
            status_code: None,
            error_message: Some(reason.into()),
        }
    }
}

/// A backend that takes a URL and a cache directive and returns a page.
///
/// `Err` means the backend call itself failed (transport, refusal);
/// `Ok` with `success == false` means the backend answered but the page
/// could not be crawled.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, cache: CacheMode) -> Result<FetchedPage>;
}

// ---------------------------------------------------------------------------
// HttpFetcher
// ---------------------------------------------------------------------------

/// Plain HTTP crawl backend built on reqwest.
pub struct HttpFetcher {
    client: Client,
    /// Allow localhost/private IPs (mock servers, intranet docs).
    allow_localhost: bool,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SiteQaError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            allow_localhost: false,
        })
    }

    /// Permit fetching loopback and private addresses.
    pub fn allow_localhost(mut self, allow: bool) -> Self {
        self.allow_localhost = allow;
        self
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, cache: CacheMode) -> Result<FetchedPage> {
        if !self.allow_localhost && is_ssrf_target(url) {
            return Err(SiteQaError::validation(format!(
                "{url}: refusing to fetch private or local address"
            )));
        }

        debug!(%url, ?cache, "fetching page");

        let mut request = self.client.get(url.as_str());
        if cache == CacheMode::Bypass {
            request = request
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache");
        }

        let response = request.send().await.map_err(|e| transport_error(url, e))?;
        let status = response.status();

        if !status.is_success() {
            return Ok(FetchedPage {
                success: false,
                html: String::new(),
                status_code: Some(status.as_u16()),
                error_message: Some(format!("HTTP {status}")),
            });
        }

        let html = response.text().await.map_err(|e| transport_error(url, e))?;

        Ok(FetchedPage {
            success: true,
            html,
            status_code: Some(status.as_u16()),
            error_message: None,
        })
    }
}

fn transport_error(url: &Url, e: reqwest::Error) -> SiteQaError {
    if e.is_timeout() {
        SiteQaError::Timeout(format!("{url}: {e}"))
    } else {
        SiteQaError::Network(format!("{url}: {e}"))
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
