//! One checker loop per target: fetch, time, match, persist, then sleep until
//! the next tick deadline, until shutdown.
//!
//! Tick deadlines are anchored on the tick's start, so a tick of length `w`
//! on interval `I` is followed by a wait of `max(0, I - w)`. Nothing that goes
//! wrong inside a tick ends the loop; shutdown is the only exit.
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, error, info, warn};

use super::probe::{FetchError, Fetcher, ProbeResult};
use super::shutdown::Shutdown;
use super::sink::MetricsSink;
use super::target::Target;
use crate::config::DEFAULT_FETCH_TIMEOUT_SECS;

/// Timing knobs shared by every loop of a fleet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckerOptions {
    /// Ceiling for one fetch attempt, independent of the poll interval.
    pub fetch_timeout: Duration,
    /// Upper bound of the random delay before the first tick. Zero disables it.
    pub start_jitter: Duration,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs_f64(DEFAULT_FETCH_TIMEOUT_SECS),
            start_jitter: Duration::ZERO,
        }
    }
}

#[derive(Debug)]
enum LoopState {
    Starting,
    Probing,
    Persisting { result: ProbeResult, started: Instant },
    Waiting { deadline: Instant },
    Cancelled,
}

pub struct CheckerLoop<F: Fetcher> {
    target: Target,
    fetcher: F,
    sink: Arc<dyn MetricsSink>,
    options: CheckerOptions,
    shutdown: Shutdown,
}

impl<F: Fetcher + 'static> CheckerLoop<F> {
    pub fn new(
        target: Target,
        fetcher: F,
        sink: Arc<dyn MetricsSink>,
        options: CheckerOptions,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            target,
            fetcher,
            sink,
            options,
            shutdown,
        }
    }

    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    /// Runs until shutdown and returns the number of completed ticks.
    pub async fn run(self) -> u64 {
        let url = self.target.address.clone();
        info!(
            target_url = %url,
            interval_secs = self.target.interval.as_secs(),
            "Starting website check."
        );

        let mut completed_ticks = 0u64;
        let mut state = LoopState::Starting;
        loop {
            state = match state {
                LoopState::Starting => {
                    let delay = self.initial_delay();
                    if delay.is_zero() {
                        LoopState::Probing
                    } else {
                        debug!(
                            target_url = %url,
                            delay_ms = delay.as_millis() as u64,
                            "Delaying first tick."
                        );
                        tokio::select! {
                            biased;
                            _ = self.shutdown.cancelled() => LoopState::Cancelled,
                            _ = sleep(delay) => LoopState::Probing,
                        }
                    }
                }
                LoopState::Probing => {
                    if self.shutdown.is_cancelled() {
                        LoopState::Cancelled
                    } else {
                        tokio::select! {
                            biased;
                            _ = self.shutdown.cancelled() => LoopState::Cancelled,
                            (result, started) = self.probe() => {
                                LoopState::Persisting { result, started }
                            }
                        }
                    }
                }
                LoopState::Persisting { result, started } => {
                    self.persist(&result).await;
                    completed_ticks += 1;
                    LoopState::Waiting {
                        deadline: started + self.target.interval,
                    }
                }
                LoopState::Waiting { deadline } => {
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => LoopState::Cancelled,
                        _ = sleep_until(deadline) => LoopState::Probing,
                    }
                }
                LoopState::Cancelled => break,
            };
        }

        info!(target_url = %url, ticks = completed_ticks, "Website check cancelled.");
        completed_ticks
    }

    fn initial_delay(&self) -> Duration {
        let max_ms = self.options.start_jitter.as_millis() as u64;
        if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::random_range(0..=max_ms))
        }
    }

    /// One fetch attempt. Never fails: errors become absent fields.
    async fn probe(&self) -> (ProbeResult, Instant) {
        let observed_at = Utc::now();
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            self.options.fetch_timeout,
            self.fetcher.fetch(&self.target.address),
        )
        .await
        .unwrap_or_else(|_| Err(FetchError::TimedOut(self.options.fetch_timeout)));
        let latency = started.elapsed();

        let (status_code, pattern_matched) = match outcome {
            Ok(page) => (
                Some(page.status),
                page.body.as_deref().and_then(|body| self.target.evaluate(body)),
            ),
            Err(e) => {
                warn!(
                    target_url = %self.target.address,
                    error = %e,
                    latency_ms = latency.as_millis() as u64,
                    "Error checking website."
                );
                (None, None)
            }
        };

        let result = ProbeResult {
            target_address: self.target.address.to_string(),
            observed_at,
            status_code,
            latency,
            pattern_matched,
        };
        (result, started)
    }

    async fn persist(&self, result: &ProbeResult) {
        match self.sink.append(result, &self.shutdown).await {
            Ok(()) => info!(
                target_url = %result.target_address,
                status = ?result.status_code,
                matched = ?result.pattern_matched,
                latency_ms = result.latency.as_millis() as u64,
                "Probe recorded."
            ),
            // The result is dropped; the next tick still runs.
            Err(e) => error!(
                target_url = %result.target_address,
                observed_at = %result.observed_at,
                error = %e,
                "Failed to persist probe result."
            ),
        }
    }
}
