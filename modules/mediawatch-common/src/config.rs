use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Application configuration, loaded from a TOML file.
/// Every knob has a default so an empty file is a valid config.
/// `DATABASE_URL` in the environment overrides the file value.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Connection URL; the scheme selects the backend.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory where parse failures are dumped for post-mortem.
    #[serde(default = "default_diagnostics_dir")]
    pub diagnostics_dir: PathBuf,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub internet_archive: InternetArchiveConfig,

    #[serde(default)]
    pub snapshots: SnapshotsConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub index: IndexConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Overall deadline for each outbound request, in seconds.
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InternetArchiveConfig {
    /// Token-bucket rate: at most `limiter_max_rate` connections per
    /// `limiter_time_period` seconds.
    #[serde(default = "default_limiter_max_rate")]
    pub limiter_max_rate: u32,
    #[serde(default = "default_limiter_time_period")]
    pub limiter_time_period: u64,

    /// Forced quiet period after an HTTP 429, in seconds.
    #[serde(default = "default_relaxation_429")]
    pub relaxation_time_after_error_429: u64,
    /// Forced quiet period after a connection-level error, in seconds.
    #[serde(default = "default_relaxation_connect")]
    pub relaxation_time_after_error_connect: u64,

    /// Directory holding the persistent error-gate files.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnapshotsConfig {
    /// How many days back the watchdog scans.
    #[serde(default = "default_days_in_past")]
    pub days_in_past: u32,
    /// Which local hours of each day to capture.
    #[serde(default = "default_hours")]
    pub hours: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingsConfig {
    /// Embedding model handle, resolved by the embedder implementation.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Vector dimension the model produces.
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
    /// Titles encoded per batch.
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
    /// Pause between polls for un-embedded titles, in seconds.
    #[serde(default = "default_embedding_poll_secs")]
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Binary ANN structure.
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    /// Companion title-id mapping.
    #[serde(default = "default_mapping_path")]
    pub mapping_path: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::Invalid {
                path: path.to_path_buf(),
                source,
            })?;

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database_url = url;
        }

        Ok(config)
    }

    /// Defaults-only configuration, no file involved.
    pub fn default_values() -> Self {
        let mut config: Config = toml::from_str("").expect("empty config must deserialize");
        if let Ok(url) = env::var("DATABASE_URL") {
            config.database_url = url;
        }
        config
    }

    /// Extract the SQLite file path from `database_url`.
    /// Any other scheme is a configuration error.
    pub fn sqlite_path(&self) -> Result<&str, ConfigError> {
        self.database_url
            .strip_prefix("sqlite:")
            .map(|p| p.trim_start_matches("//"))
            .ok_or_else(|| ConfigError::UnsupportedDatabase(self.database_url.clone()))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for InternetArchiveConfig {
    fn default() -> Self {
        Self {
            limiter_max_rate: default_limiter_max_rate(),
            limiter_time_period: default_limiter_time_period(),
            relaxation_time_after_error_429: default_relaxation_429(),
            relaxation_time_after_error_connect: default_relaxation_connect(),
            state_dir: default_state_dir(),
        }
    }
}

impl Default for SnapshotsConfig {
    fn default() -> Self {
        Self {
            days_in_past: default_days_in_past(),
            hours: default_hours(),
        }
    }
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            poll_interval_secs: default_embedding_poll_secs(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            mapping_path: default_mapping_path(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:mediawatch.db".to_string()
}

fn default_diagnostics_dir() -> PathBuf {
    env::temp_dir().join("mediawatch-parse-failures")
}

fn default_http_timeout_secs() -> u64 {
    60
}

fn default_limiter_max_rate() -> u32 {
    10
}

fn default_limiter_time_period() -> u64 {
    60
}

fn default_relaxation_429() -> u64 {
    1800
}

fn default_relaxation_connect() -> u64 {
    600
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_days_in_past() -> u32 {
    7
}

fn default_hours() -> Vec<u32> {
    vec![8, 12, 18, 22]
}

fn default_embedding_model() -> String {
    "multilingual-e5-large".to_string()
}

fn default_embedding_dimension() -> usize {
    1024
}

fn default_embedding_batch_size() -> usize {
    64
}

fn default_embedding_poll_secs() -> u64 {
    5
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./similarity.index")
}

fn default_mapping_path() -> PathBuf {
    PathBuf::from("./similarity.titles")
}
