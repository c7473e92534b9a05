//! Target definitions: the serde shape shared by the targets file and the
//! `monitored_urls` table, and the validated form a checker loop runs on.
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 300;

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error(
        "Interval {interval}s for '{url}' is outside {}-{}s",
        MIN_INTERVAL_SECS,
        MAX_INTERVAL_SECS
    )]
    IntervalOutOfRange { url: String, interval: u64 },
    #[error("Invalid pattern for '{url}': {source}")]
    InvalidPattern { url: String, source: regex::Error },
    #[error("Failed to read targets file {path:?}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Failed to parse targets JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("JSON root must be a list")]
    NotAList,
    #[error("Invalid target at index {index}: {source}")]
    InvalidEntry {
        index: usize,
        source: Box<TargetError>,
    },
}

/// One unvalidated target entry, as written by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TargetSpec {
    pub url: String,
    /// Poll interval in seconds.
    pub interval: u64,
    #[serde(default)]
    pub regex: Option<String>,
}

/// A validated, immutable endpoint description.
#[derive(Debug, Clone)]
pub struct Target {
    pub address: Url,
    pub interval: Duration,
    pub pattern: Option<Regex>,
}

impl TargetSpec {
    pub fn validate(&self) -> Result<Target, TargetError> {
        let address = Url::parse(&self.url).map_err(|e| TargetError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(address.scheme(), "http" | "https") {
            return Err(TargetError::InvalidUrl {
                url: self.url.clone(),
                reason: format!("unsupported scheme '{}'", address.scheme()),
            });
        }
        if address.host_str().is_none_or(str::is_empty) {
            return Err(TargetError::InvalidUrl {
                url: self.url.clone(),
                reason: "missing host".to_string(),
            });
        }

        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&self.interval) {
            return Err(TargetError::IntervalOutOfRange {
                url: self.url.clone(),
                interval: self.interval,
            });
        }

        let pattern = self
            .regex
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|source| TargetError::InvalidPattern {
                url: self.url.clone(),
                source,
            })?;

        Ok(Target {
            address,
            interval: Duration::from_secs(self.interval),
            pattern,
        })
    }
}

impl Target {
    /// Returns `None` when no pattern is configured; absence is not a miss.
    pub fn evaluate(&self, body: &str) -> Option<bool> {
        self.pattern.as_ref().map(|pattern| pattern.is_match(body))
    }
}

/// Parses a JSON list of target entries, rejecting the whole document on
/// the first invalid one.
pub fn parse_targets(json: &str) -> Result<Vec<TargetSpec>, TargetError> {
    let raw: serde_json::Value = serde_json::from_str(json)?;
    let serde_json::Value::Array(entries) = raw else {
        return Err(TargetError::NotAList);
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let spec: TargetSpec =
                serde_json::from_value(entry).map_err(|e| TargetError::InvalidEntry {
                    index,
                    source: Box::new(TargetError::Json(e)),
                })?;
            spec.validate().map_err(|e| TargetError::InvalidEntry {
                index,
                source: Box::new(e),
            })?;
            Ok(spec)
        })
        .collect()
}

pub fn load_targets_file(path: &Path) -> Result<Vec<TargetSpec>, TargetError> {
    let contents = fs::read_to_string(path).map_err(|source| TargetError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_targets(&contents)
}
