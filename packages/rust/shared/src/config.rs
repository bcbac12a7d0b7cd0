//! Application configuration for TowScout.
//!
//! User config lives at `~/.towscout/towscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TowScoutError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "towscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".towscout";

// ---------------------------------------------------------------------------
// Config structs (matching towscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Apify maps-search actor settings.
    #[serde(default)]
    pub apify: ApifyConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Maximum simultaneous in-flight website fetches. A politeness bound,
    /// not a throughput knob.
    #[serde(default = "default_scrape_concurrency")]
    pub scrape_concurrency: u32,

    /// Per-fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Default maps search query.
    #[serde(default = "default_search_query")]
    pub search_query: String,

    /// Default cap on listings returned per crawl.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Default staleness threshold for `refresh`, in days.
    #[serde(default = "default_days_stale")]
    pub days_stale: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            scrape_concurrency: default_scrape_concurrency(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            search_query: default_search_query(),
            max_results: default_max_results(),
            days_stale: default_days_stale(),
        }
    }
}

fn default_scrape_concurrency() -> u32 {
    5
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_search_query() -> String {
    "towing company".into()
}
fn default_max_results() -> u32 {
    100
}
fn default_days_stale() -> u32 {
    30
}

/// `[apify]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApifyConfig {
    /// Name of the env var holding the API token (never store the token itself).
    #[serde(default = "default_api_token_env")]
    pub api_token_env: String,

    /// Actor id of the maps scraper.
    #[serde(default = "default_actor_id")]
    pub actor_id: String,

    /// API base URL. Overridable for tests.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Seconds between run-status polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum seconds to wait for a run to finish.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for ApifyConfig {
    fn default() -> Self {
        Self {
            api_token_env: default_api_token_env(),
            actor_id: default_actor_id(),
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

fn default_api_token_env() -> String {
    "APIFY_TOKEN".into()
}
fn default_actor_id() -> String {
    "apify/google-maps-scraper".into()
}
fn default_base_url() -> String {
    "https://api.apify.com/v2".into()
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_max_wait_secs() -> u64 {
    600
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.towscout/towscout.db".into()
}

impl DatabaseConfig {
    /// Resolve the configured path, expanding a leading `~`.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if let Some(rest) = self.path.strip_prefix("~/") {
            let home = dirs::home_dir()
                .ok_or_else(|| TowScoutError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        } else {
            Ok(PathBuf::from(&self.path))
        }
    }
}

// ---------------------------------------------------------------------------
// Scrape config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime batch-scrape configuration — merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Maximum simultaneous in-flight fetch+classify operations.
    pub concurrency: u32,
    /// Per-fetch timeout in seconds.
    pub fetch_timeout_secs: u64,
}

impl From<&AppConfig> for ScrapeConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.defaults.scrape_concurrency,
            fetch_timeout_secs: config.defaults.fetch_timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.towscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TowScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.towscout/towscout.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| TowScoutError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| TowScoutError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TowScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TowScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TowScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the Apify API token env var is set and non-empty, returning
/// the token.
pub fn validate_api_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.apify.api_token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(TowScoutError::config(format!(
            "Apify API token not found. Set the {var_name} environment variable.\n\
             Get a token at https://console.apify.com/account/integrations"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("scrape_concurrency"));
        assert!(toml_str.contains("APIFY_TOKEN"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.scrape_concurrency, 5);
        assert_eq!(parsed.apify.api_token_env, "APIFY_TOKEN");
        assert_eq!(parsed.defaults.search_query, "towing company");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
scrape_concurrency = 2

[apify]
actor_id = "custom/maps-actor"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.scrape_concurrency, 2);
        assert_eq!(config.defaults.max_results, 100);
        assert_eq!(config.apify.actor_id, "custom/maps-actor");
        assert_eq!(config.apify.base_url, "https://api.apify.com/v2");
    }

    #[test]
    fn scrape_config_from_app_config() {
        let app = AppConfig::default();
        let scrape = ScrapeConfig::from(&app);
        assert_eq!(scrape.concurrency, 5);
        assert_eq!(scrape.fetch_timeout_secs, 30);
    }

    #[test]
    fn api_token_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.apify.api_token_env = "TS_TEST_NONEXISTENT_TOKEN_12345".into();
        let result = validate_api_token(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("token not found"));
    }

    #[test]
    fn db_path_without_tilde_is_verbatim() {
        let db = DatabaseConfig {
            path: "/tmp/towscout-test.db".into(),
        };
        assert_eq!(
            db.resolved_path().unwrap(),
            PathBuf::from("/tmp/towscout-test.db")
        );
    }
}
