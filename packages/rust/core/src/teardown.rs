//! Best-effort reversal of a session's remote state.
//!
//! Every step is isolated: a failing resource is logged and counted, and the
//! remaining steps still run. A resource that is already gone counts as
//! removed.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use siteqa_docstore::DocumentStore;
use siteqa_shared::Result;
use siteqa_storage::SessionStore;

/// What a teardown removed.
#[derive(Debug, Clone, Default)]
pub struct TeardownReport {
    /// Whether a session record existed before teardown.
    pub record_found: bool,
    pub vector_store_id: Option<String>,
    pub store_files_detached: usize,
    pub files_deleted: usize,
    pub vector_store_deleted: bool,
    pub threads_deleted: usize,
    /// Resources that were already gone remotely.
    pub already_gone: usize,
    /// One line per resource that could not be removed.
    pub failures: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of deleting one remote resource.
enum Removal {
    Deleted,
    AlreadyGone,
    Failed(String),
}

impl Removal {
    fn from_result(what: &str, result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Deleted,
            Err(e) if e.is_not_found() => Self::AlreadyGone,
            Err(e) => {
                warn!(resource = %what, error = %e, "teardown step failed");
                Self::Failed(format!("{what}: {e}"))
            }
        }
    }

    /// Fold into the report. Returns whether the resource is gone now.
    fn record(self, report: &mut TeardownReport) -> bool {
        match self {
            Self::Deleted => true,
            Self::AlreadyGone => {
                report.already_gone += 1;
                true
            }
            Self::Failed(reason) => {
                report.failures.push(reason);
                false
            }
        }
    }
}

/// Delete the session's store files, vector store, threads and record.
///
/// A session with no vector store only loses its threads and record. Running
/// this twice is harmless.
#[instrument(skip(store, sessions))]
pub async fn teardown_session(
    store: Arc<dyn DocumentStore>,
    sessions: &SessionStore,
    session: &str,
) -> Result<TeardownReport> {
    let record_found = sessions.exists(session).await?;
    let record = sessions.load(session).await?;
    let mut report = TeardownReport {
        record_found,
        vector_store_id: record.vector_store_id.clone(),
        ..TeardownReport::default()
    };

    if !record_found {
        info!("no session record, nothing to tear down remotely");
    }

    // --- Vector store and its files ---
    if let Some(store_id) = &record.vector_store_id {
        match store.list_store_files(store_id).await {
            Ok(file_ids) => detach_files(&store, store_id, file_ids, &mut report).await,
            Err(e) if e.is_not_found() => {
                report.already_gone += 1;
            }
            Err(e) => {
                warn!(vector_store_id = %store_id, error = %e, "could not list store files");
                report.failures.push(format!("list files of {store_id}: {e}"));
            }
        }

        let removal = Removal::from_result(
            &format!("vector store {store_id}"),
            store.delete_vector_store(store_id).await,
        );
        let deleted = removal.record(&mut report);
        report.vector_store_deleted = deleted;
    }

    // --- Uploaded but never attached ---
    let mut handles = Vec::with_capacity(record.pending_files.len());
    for file_id in record.pending_files.iter().cloned() {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let result = store.delete_file(&file_id).await;
            Removal::from_result(&format!("file {file_id}"), result)
        }));
    }
    for handle in handles {
        let removal = match handle.await {
            Ok(removal) => removal,
            Err(e) => Removal::Failed(format!("file deletion task aborted: {e}")),
        };
        if removal.record(&mut report) {
            report.files_deleted += 1;
        }
    }

    // --- Threads ---
    let mut handles = Vec::new();
    for thread_id in record.known_threads() {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let result = store.delete_thread(&thread_id).await;
            Removal::from_result(&format!("thread {thread_id}"), result)
        }));
    }
    for handle in handles {
        let removal = match handle.await {
            Ok(removal) => removal,
            Err(e) => Removal::Failed(format!("thread deletion task aborted: {e}")),
        };
        if removal.record(&mut report) {
            report.threads_deleted += 1;
        }
    }

    // --- Local record ---
    sessions.delete(session).await?;

    info!(
        store_files = report.store_files_detached,
        files = report.files_deleted,
        threads = report.threads_deleted,
        already_gone = report.already_gone,
        failures = report.failures.len(),
        "teardown finished"
    );
    Ok(report)
}

/// Detach every file from the store, then delete the file object. Files are
/// processed concurrently and independently.
async fn detach_files(
    store: &Arc<dyn DocumentStore>,
    store_id: &str,
    file_ids: Vec<String>,
    report: &mut TeardownReport,
) {
    let mut handles = Vec::with_capacity(file_ids.len());

    for file_id in file_ids {
        let store = Arc::clone(store);
        let store_id = store_id.to_string();
        handles.push(tokio::spawn(async move {
            let detached = Removal::from_result(
                &format!("store file {file_id}"),
                store.delete_store_file(&store_id, &file_id).await,
            );
            let deleted =
                Removal::from_result(&format!("file {file_id}"), store.delete_file(&file_id).await);
            (detached, deleted)
        }));
    }

    for handle in handles {
        match handle.await {
            Ok((detached, deleted)) => {
                if detached.record(report) {
                    report.store_files_detached += 1;
                }
                if deleted.record(report) {
                    report.files_deleted += 1;
                }
            }
            Err(e) => report.failures.push(format!("file teardown task aborted: {e}")),
        }
    }
}
