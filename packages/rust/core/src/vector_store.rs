//! Vector-store lifecycle: resolve-or-create per thread, and verified batch
//! attach.

use tracing::{debug, info, instrument, warn};

use siteqa_docstore::{BatchStatus, DocumentStore, FileBatch};
use siteqa_shared::{PollConfig, Result, SiteQaError};

/// Name given to a store created for `session`.
pub fn vector_store_name(session: &str) -> String {
    format!("vs_{session}")
}

/// Return the vector store bound to `thread_id`, creating and binding one if
/// needed.
///
/// Resolution order:
/// 1. a store already bound to the thread (the first one if several are)
/// 2. `recorded`, the store id saved in the session record, re-bound
/// 3. a new store named after the session, then bound
///
/// Once a store is bound, calling this again yields the same id.
#[instrument(skip(store, recorded))]
pub async fn resolve_vector_store(
    store: &dyn DocumentStore,
    thread_id: &str,
    session: &str,
    recorded: Option<&str>,
) -> Result<String> {
    let thread = store.retrieve_thread(thread_id).await?;

    if let Some((first, rest)) = thread.vector_store_ids().split_first() {
        if !rest.is_empty() {
            warn!(
                vector_store_id = %first,
                ignored = ?rest,
                "thread has several vector stores bound, using the first"
            );
        }
        debug!(vector_store_id = %first, "reusing bound vector store");
        return Ok(first.clone());
    }

    if let Some(recorded) = recorded {
        match store.bind_vector_store(thread_id, recorded).await {
            Ok(_) => {
                info!(vector_store_id = %recorded, "re-bound recorded vector store");
                return Ok(recorded.to_string());
            }
            Err(e) if e.is_not_found() => {
                warn!(vector_store_id = %recorded, "recorded vector store no longer exists");
            }
            Err(e) => return Err(e),
        }
    }

    let created = store
        .create_vector_store(&vector_store_name(session))
        .await?;
    store.bind_vector_store(thread_id, &created.id).await?;

    info!(vector_store_id = %created.id, "created and bound vector store");
    Ok(created.id)
}

/// Attach `file_ids` to `store_id` in one batch and wait for a terminal status.
///
/// A `completed` batch succeeds even when some files failed processing; those
/// are logged. Any other terminal state is [`SiteQaError::BatchFailed`], and
/// exceeding `poll.timeout` is [`SiteQaError::Timeout`]. The attach is never
/// retried here.
#[instrument(skip(store, file_ids, poll), fields(files = file_ids.len()))]
pub async fn attach_batch(
    store: &dyn DocumentStore,
    store_id: &str,
    file_ids: &[String],
    poll: PollConfig,
) -> Result<FileBatch> {
    let batch = store.create_file_batch(store_id, file_ids).await?;
    debug!(batch_id = %batch.id, status = %batch.status, "file batch created");

    let batch_id = batch.id.clone();
    let settled = tokio::time::timeout(poll.timeout, poll_until_terminal(store, store_id, batch, poll))
        .await
        .map_err(|_| {
            SiteQaError::Timeout(format!(
                "file batch {batch_id} still in progress after {}s",
                poll.timeout.as_secs()
            ))
        })??;

    let counts = settled.file_counts;
    if settled.status == BatchStatus::Completed {
        if counts.failed > 0 {
            warn!(
                batch_id = %settled.id,
                completed = counts.completed,
                failed = counts.failed,
                "file batch completed with failed files"
            );
        } else {
            info!(batch_id = %settled.id, completed = counts.completed, "file batch completed");
        }
        return Ok(settled);
    }

    warn!(
        batch_id = %settled.id,
        status = %settled.status,
        failed = counts.failed,
        "file batch did not complete"
    );
    Err(SiteQaError::BatchFailed {
        batch_id: settled.id,
        status: settled.status.to_string(),
        failed: counts.failed,
    })
}

async fn poll_until_terminal(
    store: &dyn DocumentStore,
    store_id: &str,
    mut batch: FileBatch,
    poll: PollConfig,
) -> Result<FileBatch> {
    while !batch.status.is_terminal() {
        tokio::time::sleep(poll.interval).await;
        batch = store.retrieve_file_batch(store_id, &batch.id).await?;
        debug!(batch_id = %batch.id, status = %batch.status, "polled file batch");
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::FakeDocumentStore;

    fn poll() -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let fake = FakeDocumentStore::default().with_thread("thread_1", &[]);

        let first = resolve_vector_store(&fake, "thread_1", "s1", None).await.unwrap();
        let second = resolve_vector_store(&fake, "thread_1", "s1", None).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(fake.count_calls("create_vector_store"), 1);
        assert_eq!(fake.store_names(), vec!["vs_s1".to_string()]);
    }

    #[tokio::test]
    async fn resolve_reuses_first_bound_store() {
        let fake = FakeDocumentStore::default().with_thread("thread_1", &["vs_a", "vs_b"]);

        let id = resolve_vector_store(&fake, "thread_1", "s1", None).await.unwrap();

        assert_eq!(id, "vs_a");
        assert_eq!(fake.count_calls("create_vector_store"), 0);
        assert_eq!(fake.count_calls("bind"), 0);
    }

    #[tokio::test]
    async fn resolve_rebinds_recorded_store() {
        let fake = FakeDocumentStore::default()
            .with_thread("thread_1", &[])
            .with_store("vs_saved");

        let id = resolve_vector_store(&fake, "thread_1", "s1", Some("vs_saved"))
            .await
            .unwrap();

        assert_eq!(id, "vs_saved");
        assert_eq!(fake.count_calls("create_vector_store"), 0);
        assert_eq!(fake.thread_stores("thread_1"), vec!["vs_saved".to_string()]);
    }

    #[tokio::test]
    async fn resolve_creates_when_recorded_store_is_gone() {
        let fake = FakeDocumentStore::default().with_thread("thread_1", &[]);

        let id = resolve_vector_store(&fake, "thread_1", "s1", Some("vs_deleted"))
            .await
            .unwrap();

        assert_ne!(id, "vs_deleted");
        assert_eq!(fake.count_calls("create_vector_store"), 1);
    }

    #[tokio::test]
    async fn resolve_unknown_thread_fails_without_mutation() {
        let fake = FakeDocumentStore::default();

        let err = resolve_vector_store(&fake, "thread_x", "s1", None)
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(fake.count_calls("create_vector_store"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_polls_until_completed() {
        let fake = FakeDocumentStore::default()
            .with_store("vs_1")
            .script_batches(&[BatchStatus::InProgress, BatchStatus::InProgress]);
        let ids = vec!["file-1".to_string(), "file-2".to_string()];

        let batch = attach_batch(&fake, "vs_1", &ids, poll()).await.unwrap();

        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(fake.count_calls("retrieve_file_batch"), 2);
        assert_eq!(fake.store_files("vs_1"), ids);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_failed_batch_is_fatal() {
        let fake = FakeDocumentStore::default()
            .with_store("vs_1")
            .script_batches(&[BatchStatus::InProgress, BatchStatus::Failed])
            .with_batch_failures(1);

        let err = attach_batch(&fake, "vs_1", &["file-1".to_string()], poll())
            .await
            .unwrap_err();

        match err {
            SiteQaError::BatchFailed { status, failed, .. } => {
                assert_eq!(status, "failed");
                assert_eq!(failed, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        // No retry of the attach.
        assert_eq!(fake.count_calls("create_file_batch"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_completed_with_failed_files_succeeds() {
        let fake = FakeDocumentStore::default()
            .with_store("vs_1")
            .script_batches(&[BatchStatus::InProgress, BatchStatus::Completed])
            .with_batch_failures(1);
        let ids = vec!["file-1".to_string(), "file-2".to_string()];

        let batch = attach_batch(&fake, "vs_1", &ids, poll()).await.unwrap();

        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.file_counts.failed, 1);
        assert_eq!(batch.file_counts.completed, 1);
        assert_eq!(fake.count_calls("create_file_batch"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_cancelled_batch_is_fatal() {
        let fake = FakeDocumentStore::default()
            .with_store("vs_1")
            .script_batches(&[BatchStatus::Cancelled]);

        let err = attach_batch(&fake, "vs_1", &["file-1".to_string()], poll())
            .await
            .unwrap_err();
        assert!(matches!(err, SiteQaError::BatchFailed { failed: 0, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn attach_poll_times_out() {
        let fake = FakeDocumentStore::default()
            .with_store("vs_1")
            .script_batches(&[BatchStatus::InProgress; 100]);

        let err = attach_batch(&fake, "vs_1", &["file-1".to_string()], poll())
            .await
            .unwrap_err();
        assert!(matches!(err, SiteQaError::Timeout(_)));
    }
}
