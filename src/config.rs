use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 10;
pub const DEFAULT_POOL_TIMEOUT_SECS: f64 = 5.0;
pub const DEFAULT_FETCH_TIMEOUT_SECS: f64 = 10.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("DATABASE_URL is not set in the environment, .env file or config file")]
    MissingDatabaseUrl,
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub max_pool_size: u32,
    pub pool_timeout: Duration,
    pub fetch_timeout: Duration,
    pub targets_file: PathBuf,
    pub start_jitter: Duration,
    pub log_dir: String,
    pub log_level: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
pub(crate) struct PartialSettings {
    database_url: Option<String>,
    max_pool_size: Option<u32>,
    pool_timeout_secs: Option<f64>,
    fetch_timeout_secs: Option<f64>,
    targets_file: Option<PathBuf>,
    start_jitter_secs: Option<f64>,
    log_dir: Option<String>,
    log_level: Option<String>,
}

impl PartialSettings {
    pub(crate) fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn default_targets_file() -> PathBuf {
    PathBuf::from("config.json")
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Loads settings from an optional TOML file, then lets environment
    /// variables (including those from `.env`) override it.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                PartialSettings::from_toml_str(&contents, path)?
            }
            _ => PartialSettings::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialSettings = envy::from_env()?;

        // 3. Merge: environment overrides file
        Self::merge(file_config, env_config)
    }

    pub(crate) fn merge(file: PartialSettings, env: PartialSettings) -> Result<Self, ConfigError> {
        let max_pool_size = env
            .max_pool_size
            .or(file.max_pool_size)
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        if max_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "max_pool_size must be at least 1".to_string(),
            ));
        }

        let pool_timeout = positive_secs(
            "pool_timeout_secs",
            env.pool_timeout_secs
                .or(file.pool_timeout_secs)
                .unwrap_or(DEFAULT_POOL_TIMEOUT_SECS),
        )?;
        let fetch_timeout = positive_secs(
            "fetch_timeout_secs",
            env.fetch_timeout_secs
                .or(file.fetch_timeout_secs)
                .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        )?;
        let start_jitter = secs(
            "start_jitter_secs",
            env.start_jitter_secs
                .or(file.start_jitter_secs)
                .unwrap_or(0.0),
        )?;

        Ok(Settings {
            database_url: env
                .database_url
                .or(file.database_url)
                .filter(|url| !url.trim().is_empty())
                .ok_or(ConfigError::MissingDatabaseUrl)?,
            max_pool_size,
            pool_timeout,
            fetch_timeout,
            targets_file: env
                .targets_file
                .or(file.targets_file)
                .unwrap_or_else(default_targets_file),
            start_jitter,
            log_dir: env.log_dir.or(file.log_dir).unwrap_or_else(default_log_dir),
            log_level: env
                .log_level
                .or(file.log_level)
                .unwrap_or_else(default_log_level),
        })
    }
}

/// Converts seconds to a `Duration`; anything out of range is a config error.
fn secs(name: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        ConfigError::Invalid(format!("{name} is not a usable number of seconds ({value}): {e}"))
    })
}

fn positive_secs(name: &str, value: f64) -> Result<Duration, ConfigError> {
    let duration = secs(name, value)?;
    if duration.is_zero() {
        return Err(ConfigError::Invalid(format!(
            "{name} must be a positive number of seconds, got {value}"
        )));
    }
    Ok(duration)
}
