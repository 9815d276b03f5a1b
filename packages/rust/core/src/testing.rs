//! In-memory `DocumentStore` for pipeline tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::time::Instant;

use siteqa_docstore::{
    BatchStatus, DocumentStore, FileBatch, FileCounts, FileSearchResources, RemoteFile, Thread,
    ToolResources, VectorStore,
};
use siteqa_shared::{Result, SiteQaError};

#[derive(Default)]
struct State {
    threads: BTreeMap<String, Vec<String>>,
    stores: BTreeMap<String, (String, Vec<String>)>,
    files: BTreeMap<String, String>,
    upload_failures: HashMap<String, u32>,
    upload_times: HashMap<String, Vec<Instant>>,
    batch_script: VecDeque<BatchStatus>,
    batch_failures: u64,
    batches: HashMap<String, Vec<String>>,
    delete_failures: HashSet<String>,
    calls: Vec<String>,
    next_id: u64,
}

impl State {
    fn check_delete(&self, id: &str) -> Result<()> {
        if self.delete_failures.contains(id) {
            return Err(SiteQaError::Api {
                status: 500,
                message: format!("delete of {id} failed"),
            });
        }
        Ok(())
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }

    /// Next scripted status; `Completed` once the script runs out.
    fn next_status(&mut self) -> BatchStatus {
        self.batch_script.pop_front().unwrap_or(BatchStatus::Completed)
    }

    fn settle_batch(&mut self, store_id: &str, batch_id: &str, status: BatchStatus) -> FileBatch {
        let file_ids = self
            .batches
            .get(batch_id)
            .cloned()
            .unwrap_or_default();

        if status == BatchStatus::Completed {
            if let Some((_, attached)) = self.stores.get_mut(store_id) {
                for id in &file_ids {
                    if !attached.contains(id) {
                        attached.push(id.clone());
                    }
                }
            }
        }

        let total = file_ids.len() as u64;
        let failed = match status {
            BatchStatus::Failed | BatchStatus::Completed => self.batch_failures.min(total),
            _ => 0,
        };
        FileBatch {
            id: batch_id.to_string(),
            vector_store_id: store_id.to_string(),
            status,
            file_counts: FileCounts {
                in_progress: if status == BatchStatus::InProgress { total } else { 0 },
                completed: if status == BatchStatus::Completed { total - failed } else { 0 },
                failed,
                cancelled: 0,
                total,
            },
        }
    }
}

/// Scriptable fake of the remote API.
///
/// Every trait call is logged by operation name. Batches follow the scripted
/// status queue and complete once it is exhausted.
#[derive(Default)]
pub struct FakeDocumentStore {
    state: Mutex<State>,
}

impl FakeDocumentStore {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a thread with `stores` already bound. The stores exist too.
    pub fn with_thread(self, thread_id: &str, stores: &[&str]) -> Self {
        {
            let mut state = self.lock();
            for store in stores {
                state
                    .stores
                    .entry(store.to_string())
                    .or_insert_with(|| (store.to_string(), Vec::new()));
            }
            state.threads.insert(
                thread_id.to_string(),
                stores.iter().map(|s| s.to_string()).collect(),
            );
        }
        self
    }

    pub fn with_store(self, store_id: &str) -> Self {
        self.lock()
            .stores
            .insert(store_id.to_string(), (store_id.to_string(), Vec::new()));
        self
    }

    /// Attach an existing remote file to a store.
    pub fn with_store_file(self, store_id: &str, file_id: &str, name: &str) -> Self {
        {
            let mut state = self.lock();
            state.files.insert(file_id.to_string(), name.to_string());
            state
                .stores
                .entry(store_id.to_string())
                .or_insert_with(|| (store_id.to_string(), Vec::new()))
                .1
                .push(file_id.to_string());
        }
        self
    }

    /// Remote file that exists but is not attached anywhere.
    pub fn with_file(self, file_id: &str, name: &str) -> Self {
        self.lock()
            .files
            .insert(file_id.to_string(), name.to_string());
        self
    }

    /// Statuses returned by successive batch creations and polls.
    pub fn script_batches(self, statuses: &[BatchStatus]) -> Self {
        self.lock().batch_script.extend(statuses.iter().copied());
        self
    }

    /// Failed-file count reported by `failed` and `completed` batches.
    pub fn with_batch_failures(self, failed: u64) -> Self {
        self.lock().batch_failures = failed;
        self
    }

    /// Make the next `times` uploads of `name` fail with a retryable error.
    pub fn fail_uploads(self, name: &str, times: u32) -> Self {
        self.lock().upload_failures.insert(name.to_string(), times);
        self
    }

    /// Make every deletion of `id` fail with a server error. Applies to
    /// threads, stores, files and store-file links alike.
    pub fn fail_deletes(self, id: &str) -> Self {
        self.lock().delete_failures.insert(id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == op).count()
    }

    pub fn upload_times(&self, name: &str) -> Vec<Instant> {
        self.lock().upload_times.get(name).cloned().unwrap_or_default()
    }

    pub fn store_names(&self) -> Vec<String> {
        self.lock().stores.values().map(|(name, _)| name.clone()).collect()
    }

    pub fn has_store(&self, store_id: &str) -> bool {
        self.lock().stores.contains_key(store_id)
    }

    pub fn store_files(&self, store_id: &str) -> Vec<String> {
        self.lock()
            .stores
            .get(store_id)
            .map(|(_, files)| files.clone())
            .unwrap_or_default()
    }

    pub fn thread_stores(&self, thread_id: &str) -> Vec<String> {
        self.lock().threads.get(thread_id).cloned().unwrap_or_default()
    }

    pub fn has_thread(&self, thread_id: &str) -> bool {
        self.lock().threads.contains_key(thread_id)
    }

    pub fn has_file(&self, file_id: &str) -> bool {
        self.lock().files.contains_key(file_id)
    }
}

fn thread_view(id: &str, stores: &[String]) -> Thread {
    Thread {
        id: id.to_string(),
        tool_resources: Some(ToolResources {
            file_search: Some(FileSearchResources {
                vector_store_ids: stores.to_vec(),
            }),
        }),
    }
}

fn not_found(kind: &str, id: &str) -> SiteQaError {
    SiteQaError::NotFound(format!("{kind} {id}"))
}

#[async_trait]
impl DocumentStore for FakeDocumentStore {
    async fn create_file(&self, name: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        let mut state = self.lock();
        state.calls.push("create_file".into());
        state
            .upload_times
            .entry(name.to_string())
            .or_default()
            .push(Instant::now());

        if let Some(remaining) = state.upload_failures.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SiteQaError::Api {
                    status: 503,
                    message: format!("upload of {name} unavailable"),
                });
            }
        }

        let id = state.next_id("file");
        state.files.insert(id.clone(), name.to_string());
        Ok(RemoteFile {
            id,
            filename: name.to_string(),
            bytes: Some(bytes.len() as u64),
        })
    }

    async fn create_vector_store(&self, name: &str) -> Result<VectorStore> {
        let mut state = self.lock();
        state.calls.push("create_vector_store".into());
        let id = state.next_id("vs");
        state.stores.insert(id.clone(), (name.to_string(), Vec::new()));
        Ok(VectorStore {
            id,
            name: Some(name.to_string()),
        })
    }

    async fn bind_vector_store(&self, thread_id: &str, store_id: &str) -> Result<Thread> {
        let mut state = self.lock();
        state.calls.push("bind".into());
        if !state.stores.contains_key(store_id) {
            return Err(not_found("vector store", store_id));
        }
        let stores = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| not_found("thread", thread_id))?;
        *stores = vec![store_id.to_string()];
        Ok(thread_view(thread_id, stores))
    }

    async fn create_file_batch(&self, store_id: &str, file_ids: &[String]) -> Result<FileBatch> {
        let mut state = self.lock();
        state.calls.push("create_file_batch".into());
        if !state.stores.contains_key(store_id) {
            return Err(not_found("vector store", store_id));
        }
        let batch_id = state.next_id("vsfb");
        state
            .batches
            .insert(batch_id.clone(), file_ids.to_vec());
        let status = state.next_status();
        Ok(state.settle_batch(store_id, &batch_id, status))
    }

    async fn retrieve_file_batch(&self, store_id: &str, batch_id: &str) -> Result<FileBatch> {
        let mut state = self.lock();
        state.calls.push("retrieve_file_batch".into());
        if !state.batches.contains_key(batch_id) {
            return Err(not_found("file batch", batch_id));
        }
        let status = state.next_status();
        Ok(state.settle_batch(store_id, batch_id, status))
    }

    async fn list_store_files(&self, store_id: &str) -> Result<Vec<String>> {
        let mut state = self.lock();
        state.calls.push("list_store_files".into());
        state
            .stores
            .get(store_id)
            .map(|(_, files)| files.clone())
            .ok_or_else(|| not_found("vector store", store_id))
    }

    async fn delete_store_file(&self, store_id: &str, file_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("delete_store_file".into());
        state.check_delete(file_id)?;
        let (_, files) = state
            .stores
            .get_mut(store_id)
            .ok_or_else(|| not_found("vector store", store_id))?;
        let before = files.len();
        files.retain(|f| f != file_id);
        if files.len() == before {
            return Err(not_found("store file", file_id));
        }
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("delete_file".into());
        state.check_delete(file_id)?;
        state
            .files
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| not_found("file", file_id))
    }

    async fn delete_vector_store(&self, store_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("delete_vector_store".into());
        state.check_delete(store_id)?;
        state
            .stores
            .remove(store_id)
            .map(|_| ())
            .ok_or_else(|| not_found("vector store", store_id))
    }

    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread> {
        let mut state = self.lock();
        state.calls.push("retrieve_thread".into());
        state
            .threads
            .get(thread_id)
            .map(|stores| thread_view(thread_id, stores))
            .ok_or_else(|| not_found("thread", thread_id))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push("delete_thread".into());
        state.check_delete(thread_id)?;
        state
            .threads
            .remove(thread_id)
            .map(|_| ())
            .ok_or_else(|| not_found("thread", thread_id))
    }
}
