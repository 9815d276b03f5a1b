//! Pipeline orchestration for SiteQA.
//!
//! Ties the crates together: [`Scraper`] turns a site into Markdown artifacts
//! tracked by a session, [`Uploader`] pushes those artifacts into the
//! session's vector store, and [`teardown_session`] removes everything again.

pub mod pipeline;
pub mod progress;
pub mod teardown;
pub mod upload;
pub mod vector_store;

#[cfg(test)]
mod testing;

pub use pipeline::{ScrapeSummary, Scraper};
pub use progress::{ProgressReporter, SilentProgress};
pub use teardown::{TeardownReport, teardown_session};
pub use upload::{AttemptRecord, UploadOutcome, UploadSessionReport, Uploader, upload_all};
pub use vector_store::{attach_batch, resolve_vector_store, vector_store_name};
