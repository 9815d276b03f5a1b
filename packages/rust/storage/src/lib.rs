//! Session record persistence.
//!
//! One JSON document per session, `<session>_threads.json`, under a single
//! directory. Reads and writes are whole-document; there is no partial update
//! and no locking.
//!
//! **Access rule:** a session's record belongs to one in-flight workflow at a
//! time. Callers serialize access per session; two concurrent writers for the
//! same session can lose updates.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, instrument};

use siteqa_shared::{Result, SessionRecord, SiteQaError};

/// Suffix appended to the session name to form the record file name.
const RECORD_SUFFIX: &str = "_threads.json";

/// File-backed store of [`SessionRecord`]s.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SiteQaError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the record for `session`.
    pub fn record_path(&self, session: &str) -> Result<PathBuf> {
        validate_session_name(session)?;
        Ok(self.root.join(format!("{session}{RECORD_SUFFIX}")))
    }

    /// Whether a record exists for `session`.
    pub async fn exists(&self, session: &str) -> Result<bool> {
        let path = self.record_path(session)?;
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| SiteQaError::io(&path, e))
    }

    /// Load the record for `session`.
    ///
    /// A missing file, `null` or a legacy empty list (`[]`) loads as an empty
    /// record.
    #[instrument(skip(self))]
    pub async fn load(&self, session: &str) -> Result<SessionRecord> {
        let path = self.record_path(session)?;

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no session record, starting empty");
                return Ok(SessionRecord::default());
            }
            Err(e) => return Err(SiteQaError::io(&path, e)),
        };

        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| SiteQaError::Storage(format!("{}: {e}", path.display())))?;

        match value {
            serde_json::Value::Null => Ok(SessionRecord::default()),
            serde_json::Value::Array(items) if items.is_empty() => Ok(SessionRecord::default()),
            value @ serde_json::Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| SiteQaError::Storage(format!("{}: {e}", path.display()))),
            other => Err(SiteQaError::Storage(format!(
                "{}: expected a JSON object, found {}",
                path.display(),
                json_kind(&other)
            ))),
        }
    }

    /// Replace the record for `session`, stamping `updated_at`.
    ///
    /// Written to a temp file and renamed into place so readers never observe
    /// a half-written document.
    #[instrument(skip(self, record))]
    pub async fn save(&self, record: &SessionRecord, session: &str) -> Result<SessionRecord> {
        let path = self.record_path(session)?;
        let temp = self.root.join(format!(".{session}{RECORD_SUFFIX}.tmp"));

        let mut stamped = record.clone();
        stamped.updated_at = Some(Utc::now());

        let json = serde_json::to_string_pretty(&stamped)
            .map_err(|e| SiteQaError::Storage(format!("serialize session record: {e}")))?;

        tokio::fs::write(&temp, json)
            .await
            .map_err(|e| SiteQaError::io(&temp, e))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| SiteQaError::io(&path, e))?;

        debug!(path = %path.display(), "session record saved");
        Ok(stamped)
    }

    /// Remove the record for `session`. Returns whether a record existed.
    #[instrument(skip(self))]
    pub async fn delete(&self, session: &str) -> Result<bool> {
        let path = self.record_path(session)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SiteQaError::io(&path, e)),
        }
    }
}

/// Session names become file names: non-empty, no separators, no leading dot.
pub fn validate_session_name(session: &str) -> Result<()> {
    if session.trim().is_empty() {
        return Err(SiteQaError::validation("session name must not be empty"));
    }
    if session.starts_with('.') || session.contains(['/', '\\', '\0']) {
        return Err(SiteQaError::validation(format!(
            "invalid session name {session:?}: must not start with '.' or contain path separators"
        )));
    }
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a non-empty list",
        serde_json::Value::Object(_) => "an object",
    }
}
