//! Configuration loading for postdesk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "POSTDESK_CONFIG";

/// Top-level configuration loaded from config.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Largest accepted request body, uploads included.
    pub max_upload_bytes: usize,
}

/// Where posts and uploads live.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

/// Which search engine to mirror posts into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// No engine: every search scans storage.
    #[serde(rename = "none")]
    #[value(name = "none")]
    Disabled,
    /// External Elasticsearch cluster (default).
    #[default]
    Elasticsearch,
    /// Embedded Tantivy index (requires the `ranked` feature).
    Tantivy,
}

/// Search engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub engine: Engine,
    pub url: String,
    pub index: String,
    pub timeout_secs: u64,
    /// How long an engine availability check stays valid.
    pub health_check_interval_secs: u64,
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8002".to_string(),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            engine: Engine::default(),
            url: "http://localhost:9200".to_string(),
            index: "posts".to_string(),
            timeout_secs: 5,
            health_check_interval_secs: 30,
        }
    }
}

impl StorageConfig {
    /// Data directory with `~` expanded.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.data_dir)
    }
}

impl SearchConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
}

impl Config {
    /// Load config from an explicit path, `$POSTDESK_CONFIG`, or
    /// ~/.config/postdesk/config.toml, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file is missing, or any
    /// config file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        if let Some(path) = named {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Self::load_from(&path);
        }

        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Config::default()),
        }
    }

    /// Load config from a specific TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read config {}: {e}", path.display()))?;
        Self::parse(&contents).map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or has wrongly typed values.
    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "postdesk").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Expand ~ to the user's home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(base_dirs) = BaseDirs::new()
    {
        return base_dirs.home_dir().join(rest);
    }
    PathBuf::from(path)
}
