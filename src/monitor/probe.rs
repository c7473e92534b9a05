//! Probe outcomes and the HTTP fetcher that produces them.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::version::VERSION;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to build HTTP client: {0}")]
    Build(reqwest::Error),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Request timed out after {0:?}")]
    TimedOut(Duration),
}

/// The immutable outcome of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub target_address: String,
    pub observed_at: DateTime<Utc>,
    /// Absent when no response was obtained.
    pub status_code: Option<u16>,
    pub latency: Duration,
    /// Absent when no pattern is configured or no body was read.
    pub pattern_matched: Option<bool>,
}

impl ProbeResult {
    pub fn latency_secs(&self) -> f64 {
        self.latency.as_secs_f64()
    }
}

/// What one GET produced. `body` is `None` when the headers arrived but
/// reading the body failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub status: u16,
    pub body: Option<String>,
}

/// Retrieves one page. Each checker loop owns its own fetcher.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, address: &Url) -> Result<FetchedPage, FetchError>;
}

/// `reqwest`-backed fetcher. The per-attempt timeout is enforced by the
/// checker loop, so the client itself carries none.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(format!("sitewatch/{VERSION}"))
            .build()
            .map_err(FetchError::Build)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, address: &Url) -> Result<FetchedPage, FetchError> {
        let response = self.client.get(address.clone()).send().await?;
        let status = response.status().as_u16();

        let body = match response.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(target_url = %address, status, error = %e, "Failed to read response body.");
                None
            }
        };

        Ok(FetchedPage { status, body })
    }
}
