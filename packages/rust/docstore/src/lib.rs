//! Document/vector-store API contract for SiteQA.
//!
//! [`DocumentStore`] is the seam the upload and teardown pipelines talk
//! through; [`OpenAiClient`] implements it over the OpenAI REST API. Tests
//! substitute an in-memory implementation.
//!
//! Error conventions for implementors:
//! - a missing remote object is [`SiteQaError::NotFound`]
//! - other non-2xx answers are [`SiteQaError::Api`] with the HTTP status
//! - transport failures are [`SiteQaError::Network`] or [`SiteQaError::Timeout`]
//!
//! [`SiteQaError::NotFound`]: siteqa_shared::SiteQaError::NotFound
//! [`SiteQaError::Api`]: siteqa_shared::SiteQaError::Api
//! [`SiteQaError::Network`]: siteqa_shared::SiteQaError::Network
//! [`SiteQaError::Timeout`]: siteqa_shared::SiteQaError::Timeout

pub mod openai;
pub mod types;

use async_trait::async_trait;

use siteqa_shared::Result;

pub use openai::OpenAiClient;
pub use types::{
    BatchStatus, FileBatch, FileCounts, FileSearchResources, RemoteFile, Thread, ToolResources,
    VectorStore,
};

/// Remote files, vector stores and threads.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upload a file object under its original name.
    async fn create_file(&self, name: &str, bytes: Vec<u8>) -> Result<RemoteFile>;

    async fn create_vector_store(&self, name: &str) -> Result<VectorStore>;

    /// Make `store_id` the thread's file-search store.
    async fn bind_vector_store(&self, thread_id: &str, store_id: &str) -> Result<Thread>;

    /// Start attaching `file_ids` to a store in one batch.
    async fn create_file_batch(&self, store_id: &str, file_ids: &[String]) -> Result<FileBatch>;

    async fn retrieve_file_batch(&self, store_id: &str, batch_id: &str) -> Result<FileBatch>;

    /// Ids of every file attached to a store.
    async fn list_store_files(&self, store_id: &str) -> Result<Vec<String>>;

    /// Detach a file from a store. The file object itself survives.
    async fn delete_store_file(&self, store_id: &str, file_id: &str) -> Result<()>;

    async fn delete_file(&self, file_id: &str) -> Result<()>;

    async fn delete_vector_store(&self, store_id: &str) -> Result<()>;

    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread>;

    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}
