//! Scraped-page artifacts on disk.
//!
//! Every successful crawl result becomes one Markdown file under the output
//! directory. The file name is derived from the URL: the scheme is stripped,
//! characters that are unsafe in file names are replaced by `_`, and a short
//! hash of the full URL is appended so two URLs never share a file.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use url::Url;

use siteqa_shared::{Result, SiteQaError};

/// Characters replaced by `_` in artifact names.
static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("unsafe chars regex"));

/// Longest sanitized stem kept before the hash suffix, in bytes.
const MAX_STEM_LEN: usize = 120;

/// Hex digits of the URL hash appended to each name.
const HASH_SUFFIX_LEN: usize = 8;

/// Extension of every artifact.
pub const ARTIFACT_EXTENSION: &str = "md";

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

/// Deterministic, collision-free file name for a URL.
///
/// `https://a.com/x?y=1` becomes `a.com_x_y=1-<8 hex>.md`.
pub fn artifact_file_name(url: &Url) -> String {
    let raw = url.as_str();
    let without_scheme = raw
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(raw);

    let sanitized = UNSAFE_CHARS_RE.replace_all(without_scheme, "_");
    let stem = truncate_at_char_boundary(sanitized.trim_end_matches('_'), MAX_STEM_LEN);
    let stem = if stem.is_empty() { "index" } else { stem };

    let digest = sha256_hex(raw.as_bytes());
    format!(
        "{stem}-{}.{ARTIFACT_EXTENSION}",
        &digest[..HASH_SUFFIX_LEN]
    )
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// A written artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub file_name: String,
    pub source_url: Url,
    /// SHA-256 of the written body.
    pub content_hash: String,
    pub bytes: usize,
}

/// Writes artifacts into a single output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write `body` for `url`, replacing any previous artifact for the same URL.
    ///
    /// The body goes to a hidden temp file first and is renamed into place.
    /// The returned path is absolute so it stays valid from any working
    /// directory.
    #[instrument(skip(self, body), fields(url = %url))]
    pub async fn write(&self, url: &Url, body: &str) -> Result<Artifact> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| SiteQaError::io(&self.output_dir, e))?;
        let dir = tokio::fs::canonicalize(&self.output_dir)
            .await
            .map_err(|e| SiteQaError::io(&self.output_dir, e))?;

        let file_name = artifact_file_name(url);
        let path = dir.join(&file_name);
        let temp = dir.join(format!(".{file_name}.tmp"));

        tokio::fs::write(&temp, body)
            .await
            .map_err(|e| SiteQaError::io(&temp, e))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| SiteQaError::io(&path, e))?;

        debug!(file = %file_name, size = body.len(), "wrote artifact");

        Ok(Artifact {
            path,
            file_name,
            source_url: url.clone(),
            content_hash: sha256_hex(body.as_bytes()),
            bytes: body.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("siteqa-artifacts-test-{}", uuid::Uuid::now_v7()))
    }

    #[test]
    fn name_has_no_unsafe_characters() {
        let name = artifact_file_name(&url("https://a.com/x?y=1"));
        assert!(name.starts_with("a.com_x_y=1-"), "{name}");
        assert!(name.ends_with(".md"));
        for c in [':', '/', '?', '<', '>', '"', '\\', '|', '*'] {
            assert!(!name.contains(c), "{name} contains {c}");
        }
    }

    #[test]
    fn name_is_deterministic() {
        let a = artifact_file_name(&url("https://docs.example.com/guide/install"));
        let b = artifact_file_name(&url("https://docs.example.com/guide/install"));
        assert_eq!(a, b);
    }

    #[test]
    fn colliding_sanitized_names_get_distinct_files() {
        // Both sanitize to "a.com_x_y" before the hash suffix.
        let a = artifact_file_name(&url("https://a.com/x/y"));
        let b = artifact_file_name(&url("https://a.com/x?y"));
        let c = artifact_file_name(&url("http://a.com/x/y"));
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("a.com_x_y-"));
        assert!(b.starts_with("a.com_x_y-"));
    }

    #[test]
    fn long_urls_are_truncated() {
        let long = format!("https://a.com/{}", "é".repeat(200));
        let name = artifact_file_name(&url(&long));
        assert!(name.len() <= MAX_STEM_LEN + 1 + HASH_SUFFIX_LEN + 3);
    }

    #[tokio::test]
    async fn write_creates_file() {
        let dir = temp_dir();
        let writer = ArtifactWriter::new(&dir);
        let target = url("https://docs.example.com/guide");

        let artifact = writer.write(&target, "# Guide\n").await.unwrap();

        let canonical = std::fs::canonicalize(&dir).unwrap();
        assert_eq!(artifact.path, canonical.join(&artifact.file_name));
        assert_eq!(artifact.bytes, 8);
        assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), "# Guide\n");

        // Rewriting replaces the content and leaves no temp file behind.
        let again = writer.write(&target, "# Guide v2\n").await.unwrap();
        assert_eq!(again.path, artifact.path);
        assert_ne!(again.content_hash, artifact.content_hash);
        let entries: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn written_paths_are_absolute_and_normalized() {
        let base = temp_dir();
        let indirect = base.join("nested").join("..").join("out");
        let writer = ArtifactWriter::new(&indirect);

        let artifact = writer
            .write(&url("https://docs.example.com/api"), "# API\n")
            .await
            .unwrap();

        assert!(artifact.path.is_absolute());
        assert!(
            !artifact
                .path
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir)),
            "{}",
            artifact.path.display()
        );
        let expected = std::fs::canonicalize(base.join("out")).unwrap();
        assert_eq!(artifact.path, expected.join(&artifact.file_name));

        let _ = std::fs::remove_dir_all(&base);
    }
}
