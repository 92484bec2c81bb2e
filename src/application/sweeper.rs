//! Background expiry for the evaluator's cache.
//!
//! The cache already sweeps itself from the `observe` path, but only while
//! events keep arriving. When logging goes quiet, a sweeper running on a
//! tokio interval releases the memory held by expired signatures.

use crate::application::evaluator::ThrottlingEvaluator;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "async")]
use tokio::sync::oneshot;
#[cfg(feature = "async")]
use tokio::time::interval;

/// Error returned when sweeper configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweeperConfigError {
    /// Sweep interval must be greater than zero
    ZeroInterval,
}

impl fmt::Display for SweeperConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweeperConfigError::ZeroInterval => write!(f, "sweep interval must be greater than 0"),
        }
    }
}

impl std::error::Error for SweeperConfigError {}

/// Configuration for the background sweeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl SweeperConfig {
    /// Create a configuration with the given interval.
    ///
    /// # Errors
    /// Returns `SweeperConfigError::ZeroInterval` if `interval` is zero.
    pub fn new(interval: Duration) -> Result<Self, SweeperConfigError> {
        if interval.is_zero() {
            return Err(SweeperConfigError::ZeroInterval);
        }
        Ok(Self { interval })
    }
}

/// Periodically purges expired signatures.
///
/// Holds the evaluator rather than a cache, so sweeps follow the evaluator
/// across reconfiguration.
#[derive(Debug, Clone)]
pub struct CacheSweeper {
    evaluator: Arc<ThrottlingEvaluator>,
    config: SweeperConfig,
}

impl CacheSweeper {
    /// Create a sweeper for `evaluator`.
    pub fn new(evaluator: Arc<ThrottlingEvaluator>, config: SweeperConfig) -> Self {
        Self { evaluator, config }
    }

    /// Run one sweep now, returning how many signatures were removed.
    pub fn sweep_once(&self) -> usize {
        self.evaluator.purge_expired()
    }

    /// The sweeper configuration.
    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Start sweeping on the current tokio runtime.
    ///
    /// The first sweep runs one interval after start. Stop the task with
    /// [`SweeperHandle::shutdown`]; dropping the handle also stops it.
    #[cfg(feature = "async")]
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            // The first tick of a tokio interval completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep_once();
                        if removed > 0 {
                            tracing::debug!(removed, "background sweep removed expired signatures");
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            tracing::debug!("cache sweeper stopped");
        });

        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

/// Error returned when the sweeper does not stop cleanly.
#[cfg(feature = "async")]
#[derive(Debug)]
pub enum ShutdownError {
    /// The task did not finish within the timeout
    Timeout,
    /// The task panicked or was cancelled
    TaskFailed(tokio::task::JoinError),
}

#[cfg(feature = "async")]
impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownError::Timeout => write!(f, "cache sweeper did not stop in time"),
            ShutdownError::TaskFailed(err) => write!(f, "cache sweeper task failed: {}", err),
        }
    }
}

#[cfg(feature = "async")]
impl std::error::Error for ShutdownError {}

/// Handle to a running sweeper.
#[cfg(feature = "async")]
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

#[cfg(feature = "async")]
impl SweeperHandle {
    /// Ask the sweeper to stop and wait up to one second for it.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(Duration::from_secs(1), &mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ShutdownError::TaskFailed(err)),
            Err(_) => {
                self.task.abort();
                Err(ShutdownError::Timeout)
            }
        }
    }

    /// Check whether the task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(feature = "async")]
impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
