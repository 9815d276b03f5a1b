//! Shared types, error model, and configuration for SiteQA.
//!
//! This crate is the foundation depended on by all other SiteQA crates.
//! It provides:
//! - [`SiteQaError`] — the unified error type
//! - Domain types ([`CrawlTarget`], [`SessionRecord`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], [`UploadConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlConfig, CrawlSettings, DefaultsConfig, OpenAiConfig, PollConfig, UploadConfig,
    UploadSettings, api_key, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from,
};
pub use error::{Result, SiteQaError};
pub use types::{CrawlTarget, SessionRecord};
