//! Crawl backends and the batched crawl engine for SiteQA.
//!
//! - [`PageFetcher`]: the crawl backend contract (URL + cache directive in,
//!   success flag + payload out), with [`HttpFetcher`] as the default backend
//! - [`Crawler`]: runs targets in sequential batches of concurrent fetches

pub mod engine;
pub mod fetcher;

pub use engine::{CrawlProgress, CrawlResult, CrawlSummary, Crawler, NoCrawlProgress};
pub use fetcher::{CacheMode, FetchedPage, HttpFetcher, PageFetcher, is_ssrf_target};
