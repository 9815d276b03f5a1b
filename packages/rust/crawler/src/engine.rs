//! Batched crawl engine.
//!
//! Targets are split into contiguous batches of at most `batch_size`. Items in
//! a batch are fetched concurrently, each in its own task with its own
//! deadline; the next batch starts only after every task of the current one has
//! settled. A failing, hanging or panicking fetch never affects its siblings.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use url::Url;

use siteqa_shared::{CrawlConfig, CrawlTarget, Result};

use crate::fetcher::{CacheMode, HttpFetcher, PageFetcher};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of fetching one target.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// The target that was fetched.
    pub target: CrawlTarget,
    /// Raw page payload, or the reason the fetch failed.
    pub payload: std::result::Result<String, String>,
    /// When the task settled.
    pub fetched_at: DateTime<Utc>,
}

impl CrawlResult {
    pub fn is_success(&self) -> bool {
        self.payload.is_ok()
    }

    /// The page HTML, for successful results.
    pub fn html(&self) -> Option<&str> {
        self.payload.as_deref().ok()
    }

    /// The failure reason, for failed results.
    pub fn error(&self) -> Option<&str> {
        self.payload.as_ref().err().map(String::as_str)
    }
}

/// Summary of a completed `crawl_all`.
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    /// Successful results only, in target order.
    pub results: Vec<CrawlResult>,
    /// Failed fetches, kept for reporting. Never mixed into `results`.
    pub failures: Vec<CrawlResult>,
    /// Number of batches executed.
    pub batches: usize,
    /// Wall-clock duration of the whole crawl.
    pub duration: Duration,
}

/// Callbacks fired as batches start and settle.
pub trait CrawlProgress: Send + Sync {
    fn batch_started(&self, index: usize, total: usize, size: usize);
    fn batch_finished(&self, index: usize, total: usize, succeeded: usize, failed: usize);
}

/// A `CrawlProgress` that ignores everything.
pub struct NoCrawlProgress;

impl CrawlProgress for NoCrawlProgress {
    fn batch_started(&self, _index: usize, _total: usize, _size: usize) {}
    fn batch_finished(&self, _index: usize, _total: usize, _succeeded: usize, _failed: usize) {}
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Fetches sitemap targets in sequential, internally concurrent batches.
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    config: CrawlConfig,
}

impl Crawler {
    /// Create a crawler over any backend.
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: CrawlConfig) -> Self {
        Self { fetcher, config }
    }

    /// Create a crawler backed by [`HttpFetcher`].
    pub fn http(config: CrawlConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(&config)?;
        Ok(Self::new(Arc::new(fetcher), config))
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Fetch every target, `batch_size` at a time.
    ///
    /// Never fails as a whole: per-item failures are logged and collected in
    /// [`CrawlSummary::failures`]. A `batch_size` of zero is treated as one.
    #[instrument(skip_all, fields(targets = targets.len(), batch_size = batch_size))]
    pub async fn crawl_all(
        &self,
        targets: &[CrawlTarget],
        batch_size: usize,
        progress: &dyn CrawlProgress,
    ) -> CrawlSummary {
        let start = Instant::now();
        let batch_size = if batch_size == 0 {
            warn!("batch size 0 requested, using 1");
            1
        } else {
            batch_size
        };

        let total_batches = targets.len().div_ceil(batch_size);
        let cache = if self.config.bypass_cache {
            CacheMode::Bypass
        } else {
            CacheMode::Enabled
        };

        info!(
            total_batches,
            task_timeout_secs = self.config.task_timeout.as_secs(),
            "starting crawl"
        );

        let mut summary = CrawlSummary::default();

        for (index, batch) in targets.chunks(batch_size).enumerate() {
            progress.batch_started(index, total_batches, batch.len());
            debug!(batch = index, size = batch.len(), "batch started");

            let mut handles = Vec::with_capacity(batch.len());
            for target in batch {
                let fetcher = Arc::clone(&self.fetcher);
                let url = target.url().clone();
                let deadline = self.config.task_timeout;
                handles.push((
                    target.clone(),
                    tokio::spawn(async move { fetch_one(fetcher, url, cache, deadline).await }),
                ));
            }

            // Wait for every task in the batch, whatever order they finish in.
            let mut succeeded = 0;
            let mut failed = 0;
            for (target, handle) in handles {
                let payload = match handle.await {
                    Ok(payload) => payload,
                    Err(e) => Err(format!("fetch task aborted: {e}")),
                };

                let result = CrawlResult {
                    target,
                    payload,
                    fetched_at: Utc::now(),
                };

                match &result.payload {
                    Ok(_) => {
                        succeeded += 1;
                        summary.results.push(result);
                    }
                    Err(reason) => {
                        warn!(url = %result.target, batch = index, %reason, "page fetch failed");
                        failed += 1;
                        summary.failures.push(result);
                    }
                }
            }

            summary.batches += 1;
            progress.batch_finished(index, total_batches, succeeded, failed);
            debug!(batch = index, succeeded, failed, "batch settled");
        }

        summary.duration = start.elapsed();

        info!(
            batches = summary.batches,
            succeeded = summary.results.len(),
            failed = summary.failures.len(),
            duration_ms = summary.duration.as_millis(),
            "crawl completed"
        );

        summary
    }
}

/// One isolated fetch with a deadline.
async fn fetch_one(
    fetcher: Arc<dyn PageFetcher>,
    url: Url,
    cache: CacheMode,
    deadline: Duration,
) -> std::result::Result<String, String> {
    match tokio::time::timeout(deadline, fetcher.fetch(&url, cache)).await {
        Err(_) => Err(format!("timed out after {}s", deadline.as_secs_f64())),
        Ok(Err(e)) => Err(e.to_string()),
        Ok(Ok(page)) if page.success => Ok(page.html),
        Ok(Ok(page)) => Err(page
            .error_message
            .unwrap_or_else(|| "crawl backend reported failure".to_string())),
    }
}
