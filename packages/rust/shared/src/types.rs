//! Core domain types shared by the crawl and upload pipelines.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

// ---------------------------------------------------------------------------
// CrawlTarget
// ---------------------------------------------------------------------------

/// A single URL discovered from a sitemap. Never mutated after discovery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CrawlTarget(Url);

impl CrawlTarget {
    /// Wrap an absolute URL.
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    /// The target URL.
    pub fn url(&self) -> &Url {
        &self.0
    }

    /// The URL as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CrawlTarget {
    type Err = url::ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Url::parse(s)?))
    }
}

// ---------------------------------------------------------------------------
// SessionRecord
// ---------------------------------------------------------------------------

/// The persisted `<session>_threads.json` document.
///
/// `main_thread` is supplied externally; `vector_store_id` is filled in on the
/// first upload. Entries written by other tools (agent → thread maps) are kept
/// in `agent_threads` and written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Thread that receives the session's vector store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_thread: Option<String>,

    /// Vector store bound to `main_thread`, once created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_store_id: Option<String>,

    /// Local artifacts waiting to be uploaded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scraped_files: Vec<PathBuf>,

    /// Remote file ids uploaded but not yet confirmed attached.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_files: Vec<String>,

    /// Last time this record was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Any other keys, preserved verbatim.
    #[serde(flatten)]
    pub agent_threads: BTreeMap<String, serde_json::Value>,
}

impl SessionRecord {
    /// A record bound to an existing thread.
    pub fn with_main_thread(thread_id: impl Into<String>) -> Self {
        Self {
            main_thread: Some(thread_id.into()),
            ..Self::default()
        }
    }

    /// Every thread id the record knows about, `main_thread` first, without duplicates.
    ///
    /// String leaves of `agent_threads` are treated as thread ids.
    pub fn known_threads(&self) -> Vec<String> {
        let mut threads: Vec<String> = Vec::new();
        if let Some(main) = &self.main_thread {
            threads.push(main.clone());
        }
        for value in self.agent_threads.values() {
            collect_strings(value, &mut threads);
        }
        threads
    }

    /// Whether there is anything left for the uploader to do.
    pub fn has_upload_work(&self) -> bool {
        !self.scraped_files.is_empty() || !self.pending_files.is_empty()
    }

    /// Append artifact paths, skipping ones already tracked.
    pub fn track_files(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        for path in paths {
            if !self.scraped_files.contains(&path) {
                self.scraped_files.push(path);
            }
        }
    }
}

fn collect_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => {
            if !out.iter().any(|existing| existing == s) {
                out.push(s.clone());
            }
        }
        serde_json::Value::Object(map) => {
            for nested in map.values() {
                collect_strings(nested, out);
            }
        }
        serde_json::Value::Array(items) => {
            for nested in items {
                collect_strings(nested, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_target_roundtrip() {
        let target: CrawlTarget = "https://example.com/docs".parse().expect("parse");
        let json = serde_json::to_string(&target).expect("serialize");
        assert_eq!(json, "\"https://example.com/docs\"");
        let parsed: CrawlTarget = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, target);
    }

    #[test]
    fn session_record_preserves_agent_threads() {
        let json = r#"{
            "main_thread": "thread_main",
            "CEO": {"ScraperAgent": "thread_scraper", "UploaderAgent": "thread_uploader"}
        }"#;
        let record: SessionRecord = serde_json::from_str(json).expect("deserialize");
        assert_eq!(record.main_thread.as_deref(), Some("thread_main"));
        assert!(record.vector_store_id.is_none());
        assert!(record.agent_threads.contains_key("CEO"));

        let out = serde_json::to_value(&record).expect("serialize");
        assert_eq!(out["CEO"]["ScraperAgent"], "thread_scraper");
        assert!(out.get("vector_store_id").is_none());
    }

    #[test]
    fn known_threads_main_first_and_deduplicated() {
        let json = r#"{
            "main_thread": "thread_main",
            "CEO": {"AnsweringAgent": "thread_main", "ScraperAgent": "thread_b"},
            "extra": ["thread_c", 7]
        }"#;
        let record: SessionRecord = serde_json::from_str(json).expect("deserialize");
        assert_eq!(
            record.known_threads(),
            vec!["thread_main", "thread_b", "thread_c"]
        );
    }

    #[test]
    fn track_files_skips_duplicates() {
        let mut record = SessionRecord::with_main_thread("thread_1");
        record.track_files(vec![PathBuf::from("a.md"), PathBuf::from("b.md")]);
        record.track_files(vec![PathBuf::from("a.md"), PathBuf::from("c.md")]);
        assert_eq!(record.scraped_files.len(), 3);
        assert!(record.has_upload_work());
    }

    #[test]
    fn empty_record_has_no_work() {
        let record = SessionRecord::default();
        assert!(!record.has_upload_work());
        assert!(record.known_threads().is_empty());
    }
}
