//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// GitHub repository-existence check.
    #[serde(default)]
    pub github: GithubConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS. `"*"` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "phonehome_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Settings for rejecting calls to repositories that do not exist on GitHub.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// Check `github.com/{organisation}/{repository}` before registering.
    #[serde(default)]
    pub check_repo_existence: bool,

    /// Let the call through when GitHub cannot be reached.
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,

    /// GitHub REST API base URL.
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Request timeout for the existence check, in milliseconds.
    #[serde(default = "default_github_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8888
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:8080".to_string()]
}

fn default_db_path() -> String {
    "phonehome.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_fail_open() -> bool {
    true
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_github_timeout_ms() -> u64 {
    3_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            check_repo_existence: false,
            fail_open: default_fail_open(),
            api_url: default_github_api_url(),
            timeout_ms: default_github_timeout_ms(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PHONEHOME_HOST` overrides `server.host`
/// - `PHONEHOME_PORT` overrides `server.port`
/// - `PHONEHOME_CORS_ORIGINS` overrides `server.cors_origins` (comma-separated)
/// - `PHONEHOME_DB_PATH` overrides `database.path`
/// - `PHONEHOME_DB_BUSY_TIMEOUT_MS` overrides `database.busy_timeout_ms`
/// - `PHONEHOME_DB_POOL_MAX_SIZE` overrides `database.pool_max_size`
/// - `PHONEHOME_LOG_LEVEL` overrides `logging.level`
/// - `PHONEHOME_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `PHONEHOME_CHECK_REPO_EXISTENCE` overrides `github.check_repo_existence`
/// - `PHONEHOME_REPO_CHECK_FAIL_OPEN` overrides `github.fail_open`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    Ok(apply_env_overrides(config, |name| std::env::var(name).ok()))
}

fn parse_flag(value: &str) -> bool {
    value == "true" || value == "1"
}

/// Applies overrides read through `lookup`, ignoring values that fail to parse.
fn apply_env_overrides(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(parsed) = lookup("PHONEHOME_HOST").and_then(|v| v.parse().ok()) {
        config.server.host = parsed;
    }
    if let Some(parsed) = lookup("PHONEHOME_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = parsed;
    }
    if let Some(origins) = lookup("PHONEHOME_CORS_ORIGINS") {
        config.server.cors_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(db_path) = lookup("PHONEHOME_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(parsed) = lookup("PHONEHOME_DB_BUSY_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        config.database.busy_timeout_ms = parsed;
    }
    if let Some(parsed) = lookup("PHONEHOME_DB_POOL_MAX_SIZE").and_then(|v| v.parse().ok()) {
        config.database.pool_max_size = parsed;
    }
    if let Some(level) = lookup("PHONEHOME_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("PHONEHOME_LOG_JSON") {
        config.logging.json = parse_flag(&json);
    }
    if let Some(check) = lookup("PHONEHOME_CHECK_REPO_EXISTENCE") {
        config.github.check_repo_existence = parse_flag(&check);
    }
    if let Some(fail_open) = lookup("PHONEHOME_REPO_CHECK_FAIL_OPEN") {
        config.github.fail_open = parse_flag(&fail_open);
    }

    config
}
