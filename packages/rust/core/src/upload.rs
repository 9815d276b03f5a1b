//! Resilient uploader.
//!
//! Per session the workflow runs:
//!
//! ```text
//! RESOLVE_THREAD -> RESOLVE_OR_CREATE_VECTOR_STORE -> UPLOAD_FILES (parallel, isolated)
//!   -> FILTER_SUCCESSES -> ATTACH_BATCH -> VERIFY_BATCH_STATUS -> CLEAR_LOCAL_STATE
//! ```
//!
//! A session without a main thread stops before any remote call. If every
//! upload fails, nothing is attached. A failed attach is surfaced and not
//! retried; the uploaded ids stay in `pending_files` so the next run
//! re-attaches them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use siteqa_docstore::{DocumentStore, FileBatch};
use siteqa_shared::{Result, SiteQaError, UploadConfig};
use siteqa_storage::SessionStore;

use crate::progress::ProgressReporter;
use crate::vector_store::{attach_batch, resolve_vector_store};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// One upload attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub number: u32,
    /// Why the attempt failed, if it did.
    pub error: Option<String>,
    /// Delay slept after this attempt before the next one.
    pub backoff: Option<Duration>,
}

/// Final result of uploading one artifact.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub path: PathBuf,
    /// Name the remote file was created under.
    pub file_name: String,
    /// Remote file id, or the last error.
    pub result: std::result::Result<String, String>,
    pub attempts: Vec<AttemptRecord>,
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn file_id(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }
}

/// What `upload_session` did.
#[derive(Debug, Clone, Default)]
pub struct UploadSessionReport {
    pub thread_id: String,
    pub vector_store_id: Option<String>,
    /// Every per-artifact outcome, successes and failures.
    pub outcomes: Vec<UploadOutcome>,
    /// Number of files confirmed attached.
    pub attached: usize,
    pub batch: Option<FileBatch>,
    pub elapsed: Duration,
}

impl UploadSessionReport {
    pub fn uploaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Nothing was pending for the session.
    pub fn is_noop(&self) -> bool {
        self.outcomes.is_empty() && self.batch.is_none()
    }
}

// ---------------------------------------------------------------------------
// upload_all
// ---------------------------------------------------------------------------

/// Upload every artifact concurrently, each with its own retry loop.
///
/// At most `config.concurrency` uploads are in flight. One artifact's failure
/// never cancels the others. Each confirmed upload deletes its local file
/// (best effort). Returns all outcomes, or
/// [`SiteQaError::NoSuccessfulUploads`] when none succeeded.
#[instrument(skip_all, fields(files = paths.len()))]
pub async fn upload_all(
    store: Arc<dyn DocumentStore>,
    paths: &[PathBuf],
    config: &UploadConfig,
    progress: &dyn ProgressReporter,
) -> Result<Vec<UploadOutcome>> {
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let mut handles = Vec::with_capacity(paths.len());

    for path in paths {
        let store = Arc::clone(&store);
        let semaphore = Arc::clone(&semaphore);
        let config = config.clone();
        let path = path.clone();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return failed_outcome(&path, "upload pool closed".into(), Vec::new());
            };
            upload_one(store.as_ref(), &path, &config).await
        }));
    }

    let total = handles.len();
    let mut outcomes = Vec::with_capacity(total);

    for (handle, path) in handles.into_iter().zip(paths) {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => failed_outcome(path, format!("upload task aborted: {e}"), Vec::new()),
        };

        if let Err(reason) = &outcome.result {
            warn!(file = %outcome.file_name, error = %reason, "upload failed, skipping");
        }
        progress.file_uploaded(&outcome.file_name, outcome.is_success(), outcomes.len() + 1, total);
        outcomes.push(outcome);
    }

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    info!(succeeded, failed = total - succeeded, "uploads settled");

    if succeeded == 0 {
        return Err(SiteQaError::NoSuccessfulUploads { attempted: total });
    }
    Ok(outcomes)
}

/// Upload one artifact with bounded retries and exponential backoff.
async fn upload_one(store: &dyn DocumentStore, path: &Path, config: &UploadConfig) -> UploadOutcome {
    let file_name = display_name(path);
    let mut attempts = Vec::new();

    for number in 1..=config.max_attempts {
        let attempt = tokio::time::timeout(config.task_timeout, upload_attempt(store, path, &file_name))
            .await
            .unwrap_or_else(|_| {
                Err(SiteQaError::Timeout(format!(
                    "upload of {file_name} exceeded {}s",
                    config.task_timeout.as_secs()
                )))
            });

        match attempt {
            Ok(file_id) => {
                attempts.push(AttemptRecord {
                    number,
                    error: None,
                    backoff: None,
                });
                debug!(file = %file_name, %file_id, attempt = number, "uploaded");

                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(path = %path.display(), error = %e, "could not delete uploaded artifact");
                }

                return UploadOutcome {
                    path: path.to_path_buf(),
                    file_name,
                    result: Ok(file_id),
                    attempts,
                };
            }
            Err(e) => {
                let retry = e.is_retryable() && number < config.max_attempts;
                let backoff = retry.then(|| config.backoff_after(number));

                warn!(
                    file = %file_name,
                    attempt = number,
                    max_attempts = config.max_attempts,
                    error = %e,
                    retry,
                    "upload attempt failed"
                );
                attempts.push(AttemptRecord {
                    number,
                    error: Some(e.to_string()),
                    backoff,
                });

                match backoff {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return failed_outcome(path, e.to_string(), attempts),
                }
            }
        }
    }

    failed_outcome(path, "no upload attempts made".into(), attempts)
}

/// Read the artifact and create the remote file under its original name.
async fn upload_attempt(store: &dyn DocumentStore, path: &Path, file_name: &str) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SiteQaError::io(path, e))?;
    Ok(store.create_file(file_name, bytes).await?.id)
}

fn failed_outcome(path: &Path, reason: String, attempts: Vec<AttemptRecord>) -> UploadOutcome {
    UploadOutcome {
        path: path.to_path_buf(),
        file_name: display_name(path),
        result: Err(reason),
        attempts,
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Uploader
// ---------------------------------------------------------------------------

/// Runs the upload workflow for sessions.
pub struct Uploader {
    store: Arc<dyn DocumentStore>,
    sessions: SessionStore,
    config: UploadConfig,
}

impl Uploader {
    pub fn new(store: Arc<dyn DocumentStore>, sessions: SessionStore, config: UploadConfig) -> Self {
        Self {
            store,
            sessions,
            config,
        }
    }

    /// Upload the session's scraped artifacts and attach them to its store.
    ///
    /// Re-running after full success is a no-op until new artifacts appear.
    #[instrument(skip(self, progress))]
    pub async fn upload_session(
        &self,
        session: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<UploadSessionReport> {
        let start = Instant::now();

        // --- RESOLVE_THREAD ---
        progress.phase("Resolving thread");
        let mut record = self.sessions.load(session).await?;
        let thread_id = record
            .main_thread
            .clone()
            .ok_or_else(|| SiteQaError::MissingThread {
                session: session.to_string(),
            })?;

        let mut report = UploadSessionReport {
            thread_id: thread_id.clone(),
            vector_store_id: record.vector_store_id.clone(),
            ..UploadSessionReport::default()
        };

        // Tracked artifacts that vanished locally can never be uploaded.
        let tracked = record.scraped_files.len();
        let mut present = Vec::with_capacity(tracked);
        for path in std::mem::take(&mut record.scraped_files) {
            if path_exists(&path).await {
                present.push(path);
            } else {
                warn!(path = %path.display(), "artifact missing locally, dropping it");
            }
        }
        let pruned = present.len() != tracked;
        record.scraped_files = present;

        if !record.has_upload_work() {
            if pruned {
                self.sessions.save(&record, session).await?;
            }
            info!("nothing to upload");
            report.elapsed = start.elapsed();
            return Ok(report);
        }

        // --- RESOLVE_OR_CREATE_VECTOR_STORE ---
        progress.phase("Resolving vector store");
        let store_id = resolve_vector_store(
            self.store.as_ref(),
            &thread_id,
            session,
            record.vector_store_id.as_deref(),
        )
        .await?;
        report.vector_store_id = Some(store_id.clone());
        record.vector_store_id = Some(store_id.clone());
        record = self.sessions.save(&record, session).await?;

        // --- UPLOAD_FILES + FILTER_SUCCESSES ---
        let mut upload_failure = None;
        if !record.scraped_files.is_empty() {
            progress.phase("Uploading files");
            match upload_all(
                Arc::clone(&self.store),
                &record.scraped_files,
                &self.config,
                progress,
            )
            .await
            {
                Ok(outcomes) => {
                    let mut remaining = Vec::new();
                    for outcome in &outcomes {
                        match outcome.file_id() {
                            Some(id) => record.pending_files.push(id.to_string()),
                            None if path_exists(&outcome.path).await => {
                                remaining.push(outcome.path.clone());
                            }
                            None => {
                                warn!(path = %outcome.path.display(), "artifact missing locally, dropping it");
                            }
                        }
                    }
                    record.scraped_files = remaining;
                    record = self.sessions.save(&record, session).await?;
                    report.outcomes = outcomes;
                }
                // Ids left by an earlier failed attach still get attached.
                Err(e @ SiteQaError::NoSuccessfulUploads { .. })
                    if !record.pending_files.is_empty() =>
                {
                    warn!(
                        error = %e,
                        pending = record.pending_files.len(),
                        "no new uploads succeeded, attaching earlier uploads"
                    );
                    upload_failure = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        // --- ATTACH_BATCH + VERIFY_BATCH_STATUS ---
        progress.phase("Attaching files");
        let batch = attach_batch(
            self.store.as_ref(),
            &store_id,
            &record.pending_files,
            self.config.poll,
        )
        .await?;
        report.attached = record.pending_files.len();
        report.batch = Some(batch);

        // --- CLEAR_LOCAL_STATE ---
        record.pending_files.clear();
        self.sessions.save(&record, session).await?;

        if let Some(e) = upload_failure {
            return Err(e);
        }

        report.elapsed = start.elapsed();
        info!(
            uploaded = report.uploaded(),
            attached = report.attached,
            vector_store_id = %store_id,
            elapsed_ms = report.elapsed.as_millis(),
            "upload completed"
        );
        Ok(report)
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
