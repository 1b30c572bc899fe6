//! Shared types, error model, and configuration for notionblog.
//!
//! This crate is the foundation depended on by all other notionblog crates.
//! It provides:
//! - [`BlogError`]: the unified error type
//! - Domain types ([`Post`], [`SitemapEntry`], [`ChangeFrequency`])
//! - Configuration ([`AppConfig`], [`NotionSettings`], [`CollectConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CollectConfig, FetchConfig, NotionConfig, NotionSettings, SiteConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_site_url,
};
pub use error::{BlogError, Result};
pub use types::{ChangeFrequency, Post, SitemapEntry, to_iso_string};
