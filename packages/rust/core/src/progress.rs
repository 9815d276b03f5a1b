//! Progress callbacks for long-running pipelines.

use std::path::Path;

use siteqa_crawler::CrawlProgress;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a crawl batch starts.
    fn batch_started(&self, index: usize, total: usize, size: usize);
    /// Called when every fetch of a crawl batch has settled.
    fn batch_finished(&self, index: usize, total: usize, succeeded: usize, failed: usize);
    /// Called after an artifact is written to disk.
    fn artifact_written(&self, path: &Path, current: usize, total: usize);
    /// Called when an artifact upload settles, successfully or not.
    fn file_uploaded(&self, name: &str, success: bool, current: usize, total: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_started(&self, _index: usize, _total: usize, _size: usize) {}
    fn batch_finished(&self, _index: usize, _total: usize, _succeeded: usize, _failed: usize) {}
    fn artifact_written(&self, _path: &Path, _current: usize, _total: usize) {}
    fn file_uploaded(&self, _name: &str, _success: bool, _current: usize, _total: usize) {}
}

/// Adapts a `ProgressReporter` to the crawler's `CrawlProgress` interface.
pub(crate) struct PipelineCrawlProgress<'a> {
    pub(crate) inner: &'a dyn ProgressReporter,
}

impl CrawlProgress for PipelineCrawlProgress<'_> {
    fn batch_started(&self, index: usize, total: usize, size: usize) {
        self.inner.batch_started(index, total, size);
    }

    fn batch_finished(&self, index: usize, total: usize, succeeded: usize, failed: usize) {
        self.inner.batch_finished(index, total, succeeded, failed);
    }
}
