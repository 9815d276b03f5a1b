//! Error types for SiteQA.
//!
//! Library crates use [`SiteQaError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SiteQA operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteQaError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP transport error (connection refused, reset, DNS, ...).
    #[error("network error: {0}")]
    Network(String),

    /// Sitemap, HTML or API payload parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Session record persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad session name, empty input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-Markdown conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Non-success response from the document-store API.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// A remote resource (thread, store, file) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A request, task, or poll exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The session has no thread to attach uploads to.
    #[error("no main thread found for session '{session}'")]
    MissingThread { session: String },

    /// Every artifact upload failed; nothing can be attached.
    #[error("all {attempted} file upload(s) failed")]
    NoSuccessfulUploads { attempted: usize },

    /// The batch attach settled in a non-completed state.
    #[error("file batch {batch_id} ended as {status} with {failed} failed file(s)")]
    BatchFailed {
        batch_id: String,
        status: String,
        failed: u64,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteQaError>;

impl SiteQaError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Transport failures, deadlines, throttling and server-side errors are
    /// retryable. Client errors, missing resources and local validation
    /// problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => matches!(status, 408 | 409 | 429) || *status >= 500,
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Whether the error reports a remote resource that no longer exists.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Api { status: 404, .. })
    }
}
