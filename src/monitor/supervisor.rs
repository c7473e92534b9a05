//! Lifecycle of the whole fleet of checker loops.
//!
//! `Idle -> Starting -> Running -> Stopping -> Stopped`. Every loop is
//! launched before the supervisor reports `Running`; one trigger fans
//! cancellation out to all of them, and `stop` returns only after every
//! loop has finished.
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::checker::{CheckerLoop, CheckerOptions};
use super::probe::{FetchError, Fetcher, HttpFetcher};
use super::shutdown::{self, Shutdown, ShutdownTrigger};
use super::sink::MetricsSink;
use super::target::Target;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to prepare checker for '{url}': {source}")]
    FetcherSetup { url: String, source: FetchError },
    #[error("Cannot start monitoring while {0:?}")]
    InvalidState(SupervisorState),
}

struct RunningLoop {
    url: String,
    handle: JoinHandle<u64>,
}

pub struct Supervisor {
    sink: Arc<dyn MetricsSink>,
    options: CheckerOptions,
    trigger: Arc<ShutdownTrigger>,
    shutdown: Shutdown,
    running: Vec<RunningLoop>,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(sink: Arc<dyn MetricsSink>, options: CheckerOptions) -> Self {
        let (trigger, shutdown) = shutdown::channel();
        Self {
            sink,
            options,
            trigger: Arc::new(trigger),
            shutdown,
            running: Vec::new(),
            state: SupervisorState::Idle,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn running_loops(&self) -> usize {
        self.running.len()
    }

    /// Handle for requesting shutdown from elsewhere in the program.
    pub fn shutdown_trigger(&self) -> Arc<ShutdownTrigger> {
        Arc::clone(&self.trigger)
    }

    /// Launches one loop per target, each with its own HTTP client.
    pub fn start(&mut self, targets: Vec<Target>) -> Result<usize, SupervisorError> {
        self.start_with(targets, |_| HttpFetcher::new())
    }

    /// Launches one loop per target with fetchers from `make_fetcher`.
    ///
    /// Every fetcher is built before any loop is spawned, so a setup error
    /// leaves nothing running. An empty target list is not an error: the
    /// supervisor goes straight to `Stopped`.
    pub fn start_with<F, M>(
        &mut self,
        targets: Vec<Target>,
        mut make_fetcher: M,
    ) -> Result<usize, SupervisorError>
    where
        F: Fetcher + 'static,
        M: FnMut(&Target) -> Result<F, FetchError>,
    {
        if self.state != SupervisorState::Idle {
            return Err(SupervisorError::InvalidState(self.state));
        }
        if targets.is_empty() {
            warn!("No monitored URLs found. Nothing to start.");
            self.state = SupervisorState::Stopped;
            return Ok(0);
        }

        self.state = SupervisorState::Starting;
        let mut loops = Vec::with_capacity(targets.len());
        for target in targets {
            let fetcher = match make_fetcher(&target) {
                Ok(fetcher) => fetcher,
                Err(source) => {
                    self.state = SupervisorState::Stopped;
                    return Err(SupervisorError::FetcherSetup {
                        url: target.address.to_string(),
                        source,
                    });
                }
            };
            let url = target.address.to_string();
            loops.push((
                url,
                CheckerLoop::new(
                    target,
                    fetcher,
                    Arc::clone(&self.sink),
                    self.options,
                    self.shutdown.clone(),
                ),
            ));
        }

        for (url, checker) in loops {
            self.running.push(RunningLoop {
                url,
                handle: checker.spawn(),
            });
        }
        self.state = SupervisorState::Running;
        info!(count = self.running.len(), "Starting monitor for URL(s).");
        Ok(self.running.len())
    }

    /// Waits for `stop` or a programmatic trigger, whichever comes first.
    pub async fn wait_for_stop<S>(&self, stop: S)
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            _ = stop => info!("Stop signal received."),
            _ = self.shutdown.cancelled() => info!("Shutdown requested programmatically."),
        }
    }

    /// Broadcasts cancellation and waits for every loop to finish.
    /// Returns the total number of completed ticks.
    pub async fn stop(&mut self) -> u64 {
        if matches!(self.state, SupervisorState::Idle | SupervisorState::Stopped) {
            self.state = SupervisorState::Stopped;
            return 0;
        }

        self.state = SupervisorState::Stopping;
        info!(count = self.running.len(), "Cancelling website checks.");
        self.trigger.trigger();

        let finished = join_all(self.running.drain(..).map(|running| async move {
            (running.url, running.handle.await)
        }))
        .await;

        let mut total_ticks = 0;
        for (url, outcome) in finished {
            match outcome {
                Ok(ticks) => total_ticks += ticks,
                Err(join_error) => {
                    error!(target_url = %url, error = ?join_error, "Website check task panicked.")
                }
            }
        }

        self.state = SupervisorState::Stopped;
        info!(ticks = total_ticks, "Monitor shutdown complete.");
        total_ticks
    }

    /// Starts the fleet, waits for `stop`, then shuts everything down.
    pub async fn run_until<S>(
        mut self,
        targets: Vec<Target>,
        stop: S,
    ) -> Result<u64, SupervisorError>
    where
        S: Future<Output = ()>,
    {
        if self.start(targets)? == 0 {
            return Ok(0);
        }
        self.wait_for_stop(stop).await;
        Ok(self.stop().await)
    }
}
