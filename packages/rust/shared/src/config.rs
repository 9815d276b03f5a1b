//! Application configuration for SiteQA.
//!
//! User config lives at `~/.siteqa/siteqa.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SiteQaError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "siteqa.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".siteqa";

// ---------------------------------------------------------------------------
// Config structs (matching siteqa.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Crawl settings.
    #[serde(default)]
    pub crawl: CrawlSettings,

    /// OpenAI document-store settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Upload pipeline settings.
    #[serde(default)]
    pub upload: UploadSettings,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory scraped artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Directory holding `<session>_threads.json` records.
    #[serde(default = "default_session_dir")]
    pub session_dir: String,

    /// Pages fetched concurrently per crawl batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            session_dir: default_session_dir(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_output_dir() -> String {
    "scraped_content".into()
}
fn default_session_dir() -> String {
    "~/.siteqa/sessions".into()
}
fn default_batch_size() -> usize {
    5
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSettings {
    /// HTTP timeout for a single sitemap or page request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Deadline for one fetch task, including body download.
    #[serde(default = "default_crawl_task_timeout")]
    pub task_timeout_secs: u64,

    /// Ask the crawl backend to bypass caches.
    #[serde(default = "default_true")]
    pub bypass_cache: bool,

    /// Follow `<sitemapindex>` entries one level deep.
    #[serde(default = "default_true")]
    pub follow_sitemap_index: bool,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            task_timeout_secs: default_crawl_task_timeout(),
            bypass_cache: true,
            follow_sitemap_index: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    30
}
fn default_crawl_task_timeout() -> u64 {
    60
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request HTTP timeout.
    #[serde(default = "default_api_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            request_timeout_secs: default_api_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_timeout() -> u64 {
    60
}

/// `[upload]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Attempts per artifact before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay; doubles after every failed attempt.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Maximum uploads in flight.
    #[serde(default = "default_upload_concurrency")]
    pub concurrency: usize,

    /// Deadline for a single upload attempt.
    #[serde(default = "default_upload_task_timeout")]
    pub task_timeout_secs: u64,

    /// Delay between batch status polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up polling a batch after this long.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            concurrency: default_upload_concurrency(),
            task_timeout_secs: default_upload_task_timeout(),
            poll_interval_ms: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay() -> u64 {
    1000
}
fn default_upload_concurrency() -> usize {
    8
}
fn default_upload_task_timeout() -> u64 {
    120
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_poll_timeout() -> u64 {
    300
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime crawl configuration.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum pages fetched concurrently; batches run one after another.
    pub batch_size: usize,
    /// HTTP timeout for one request.
    pub request_timeout: Duration,
    /// Deadline for one fetch task.
    pub task_timeout: Duration,
    /// Whether fetches bypass caches.
    pub bypass_cache: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.defaults.batch_size,
            request_timeout: Duration::from_secs(config.crawl.request_timeout_secs),
            task_timeout: Duration::from_secs(config.crawl.task_timeout_secs),
            bypass_cache: config.crawl.bypass_cache,
        }
    }
}

/// Runtime upload configuration.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Attempts per artifact (at least 1).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub base_delay: Duration,
    /// Maximum uploads in flight.
    pub concurrency: usize,
    /// Deadline for one upload attempt.
    pub task_timeout: Duration,
    /// Batch status polling.
    pub poll: PollConfig,
}

impl UploadConfig {
    /// Backoff slept after the `failures`-th consecutive failure (1-based).
    ///
    /// With the default base of one second this yields 1s, 2s, 4s, ...
    pub fn backoff_after(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for UploadConfig {
    fn from(config: &AppConfig) -> Self {
        let upload = &config.upload;
        Self {
            max_attempts: upload.max_attempts.max(1),
            base_delay: Duration::from_millis(upload.base_delay_ms),
            concurrency: upload.concurrency.max(1),
            task_timeout: Duration::from_secs(upload.task_timeout_secs),
            poll: PollConfig {
                interval: Duration::from_millis(upload.poll_interval_ms),
                timeout: Duration::from_secs(upload.poll_timeout_secs),
            },
        }
    }
}

/// Bounded polling for a remote batch.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay between status checks.
    pub interval: Duration,
    /// Overall deadline.
    pub timeout: Duration,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.siteqa/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SiteQaError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.siteqa/siteqa.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SiteQaError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SiteQaError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SiteQaError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SiteQaError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SiteQaError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the OpenAI API key from the env var named in the config.
pub fn api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openai.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SiteQaError::config(format!(
            "OpenAI API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
