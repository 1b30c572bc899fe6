//! Application configuration for notionblog.
//!
//! User config lives at `~/.notionblog/notionblog.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets never live in the file: it only names the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BlogError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "notionblog.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".notionblog";

// ---------------------------------------------------------------------------
// Config structs (matching notionblog.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Notion API access.
    #[serde(default)]
    pub notion: NotionConfig,

    /// Public site settings.
    #[serde(default)]
    pub site: SiteConfig,

    /// Per-page fetch behaviour.
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// `[notion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    /// Name of the env var holding the integration token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Name of the env var holding the posts database id.
    #[serde(default = "default_database_id_env")]
    pub database_id_env: String,

    /// Literal database id; takes precedence over `database_id_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<String>,

    /// API root, overridable for tests and proxies.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Value of the `Notion-Version` header.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            database_id_env: default_database_id_env(),
            database_id: None,
            api_base: default_api_base(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_token_env() -> String {
    "NOTION_TOKEN".into()
}
fn default_database_id_env() -> String {
    "NOTION_DATABASE_ID".into()
}
fn default_api_base() -> String {
    "https://api.notion.com/v1".into()
}
fn default_api_version() -> String {
    "2022-06-28".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public base URL used for sitemap entries.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Env var that overrides `base_url` when set and non-empty.
    #[serde(default = "default_base_url_env")]
    pub base_url_env: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            base_url_env: default_base_url_env(),
        }
    }
}

fn default_base_url() -> String {
    "https://your-site.com".into()
}
fn default_base_url_env() -> String {
    "NEXT_PUBLIC_SITE_URL".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum number of pages fetched at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

// ---------------------------------------------------------------------------
// Runtime settings (resolved from config + environment)
// ---------------------------------------------------------------------------

/// Everything the Notion client needs, with secrets resolved from the environment.
#[derive(Debug, Clone)]
pub struct NotionSettings {
    pub token: String,
    pub database_id: String,
    pub api_base: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl NotionSettings {
    /// Resolve the token and database id from the env vars named in `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let notion = &config.notion;
        let token = read_env(&notion.token_env).ok_or_else(|| {
            BlogError::config(format!(
                "Notion token not found. Set the {} environment variable.\n\
                 Create an integration at https://www.notion.so/my-integrations",
                notion.token_env
            ))
        })?;

        let database_id = match &notion.database_id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => read_env(&notion.database_id_env).ok_or_else(|| {
                BlogError::config(format!(
                    "Notion database id not found. Set the {} environment variable \
                     or `notion.database_id` in the config file.",
                    notion.database_id_env
                ))
            })?,
        };

        Ok(Self {
            token,
            database_id,
            api_base: notion.api_base.trim_end_matches('/').to_string(),
            api_version: notion.api_version.clone(),
            timeout_secs: notion.timeout_secs,
        })
    }
}

/// Runtime settings for the collection builder.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// Maximum concurrent per-page fetches (at least 1).
    pub concurrency: usize,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl From<&AppConfig> for CollectConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.fetch.concurrency.max(1),
        }
    }
}

/// Resolve the public site URL: env override first, then the config value.
pub fn resolve_site_url(config: &AppConfig) -> Result<Url> {
    let raw = read_env(&config.site.base_url_env).unwrap_or_else(|| config.site.base_url.clone());
    let url = Url::parse(raw.trim())
        .map_err(|e| BlogError::config(format!("invalid site base URL '{raw}': {e}")))?;

    if url.cannot_be_a_base() {
        return Err(BlogError::config(format!(
            "site base URL '{raw}' cannot be used as a base"
        )));
    }
    Ok(url)
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.notionblog/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| BlogError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.notionblog/notionblog.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| BlogError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| BlogError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BlogError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BlogError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BlogError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
