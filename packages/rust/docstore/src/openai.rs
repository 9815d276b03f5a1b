//! OpenAI REST implementation of [`DocumentStore`].
//!
//! Uses the assistants v2 surface: `/files`, `/vector_stores`,
//! `/vector_stores/{id}/file_batches`, `/vector_stores/{id}/files` and
//! `/threads`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, header};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use siteqa_shared::{AppConfig, Result, SiteQaError};

use crate::DocumentStore;
use crate::types::{FileBatch, ListPage, RemoteFile, StoreFileEntry, Thread, VectorStore};

/// Beta header required by the assistants endpoints.
const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Page size used when listing store files.
const LIST_PAGE_SIZE: u32 = 100;

/// OpenAI-backed document store.
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SiteQaError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Build from config; the key comes from the env var named in `[openai]`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = siteqa_shared::api_key(config)?;
        Self::new(
            api_key,
            &config.openai.base_url,
            Duration::from_secs(config.openai.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    /// Send a request and turn non-2xx answers into errors.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, what, "OpenAI request failed");
                if e.is_timeout() {
                    SiteQaError::Timeout(format!("{what}: {e}"))
                } else {
                    SiteQaError::Network(format!("{what}: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = api_error_message(&body);

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SiteQaError::NotFound(format!("{what}: {message}")));
        }

        warn!(status = %status, error = %message, what, "OpenAI API error");
        Err(SiteQaError::Api {
            status: status.as_u16(),
            message: format!("{what}: {message}"),
        })
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        self.send(request, what)
            .await?
            .json()
            .await
            .map_err(|e| SiteQaError::parse(format!("{what}: {e}")))
    }
}

/// Prefer `error.message` from an OpenAI error body, fall back to the raw text.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl DocumentStore for OpenAiClient {
    async fn create_file(&self, name: &str, bytes: Vec<u8>) -> Result<RemoteFile> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let file: RemoteFile = self
            .json(
                self.http_client.post(self.url("/files")).multipart(form),
                &format!("create file {name}"),
            )
            .await?;

        debug!(file = %name, file_id = %file.id, "file uploaded");
        Ok(file)
    }

    async fn create_vector_store(&self, name: &str) -> Result<VectorStore> {
        self.json(
            self.http_client
                .post(self.url("/vector_stores"))
                .json(&json!({ "name": name })),
            &format!("create vector store {name}"),
        )
        .await
    }

    async fn bind_vector_store(&self, thread_id: &str, store_id: &str) -> Result<Thread> {
        let body = json!({
            "tool_resources": { "file_search": { "vector_store_ids": [store_id] } }
        });
        self.json(
            self.http_client
                .post(self.url(&format!("/threads/{thread_id}")))
                .json(&body),
            &format!("bind {store_id} to thread {thread_id}"),
        )
        .await
    }

    async fn create_file_batch(&self, store_id: &str, file_ids: &[String]) -> Result<FileBatch> {
        self.json(
            self.http_client
                .post(self.url(&format!("/vector_stores/{store_id}/file_batches")))
                .json(&json!({ "file_ids": file_ids })),
            &format!("create file batch on {store_id}"),
        )
        .await
    }

    async fn retrieve_file_batch(&self, store_id: &str, batch_id: &str) -> Result<FileBatch> {
        self.json(
            self.http_client.get(self.url(&format!(
                "/vector_stores/{store_id}/file_batches/{batch_id}"
            ))),
            &format!("retrieve file batch {batch_id}"),
        )
        .await
    }

    async fn list_store_files(&self, store_id: &str) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(self.url(&format!("/vector_stores/{store_id}/files")))
                .query(&[("limit", LIST_PAGE_SIZE.to_string())]);
            if let Some(cursor) = &after {
                request = request.query(&[("after", cursor)]);
            }

            let page: ListPage<StoreFileEntry> = self
                .json(request, &format!("list files of {store_id}"))
                .await?;

            let last = page.data.last().map(|f| f.id.clone());
            ids.extend(page.data.into_iter().map(|f| f.id));

            match (page.has_more, page.last_id.or(last)) {
                (true, Some(cursor)) => after = Some(cursor),
                _ => break,
            }
        }

        Ok(ids)
    }

    async fn delete_store_file(&self, store_id: &str, file_id: &str) -> Result<()> {
        self.send(
            self.http_client.delete(self.url(&format!(
                "/vector_stores/{store_id}/files/{file_id}"
            ))),
            &format!("detach {file_id} from {store_id}"),
        )
        .await?;
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<()> {
        self.send(
            self.http_client.delete(self.url(&format!("/files/{file_id}"))),
            &format!("delete file {file_id}"),
        )
        .await?;
        Ok(())
    }

    async fn delete_vector_store(&self, store_id: &str) -> Result<()> {
        self.send(
            self.http_client
                .delete(self.url(&format!("/vector_stores/{store_id}"))),
            &format!("delete vector store {store_id}"),
        )
        .await?;
        Ok(())
    }

    async fn retrieve_thread(&self, thread_id: &str) -> Result<Thread> {
        self.json(
            self.http_client.get(self.url(&format!("/threads/{thread_id}"))),
            &format!("retrieve thread {thread_id}"),
        )
        .await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.send(
            self.http_client
                .delete(self.url(&format!("/threads/{thread_id}"))),
            &format!("delete thread {thread_id}"),
        )
        .await?;
        Ok(())
    }
}
