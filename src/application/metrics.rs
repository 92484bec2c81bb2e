//! Observability metrics for throttling and dispatch.
//!
//! Provides counters describing what the appender did with the events it saw
//! and what happened to the jobs it dispatched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking throttling and dispatch statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters, so the evaluator, the dispatch pool, and
/// the layer can all report into one instance.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Events that passed the throttle
    events_triggered: AtomicU64,
    /// Events suppressed as duplicates
    events_throttled: AtomicU64,
    /// Cache entries removed by expiry sweeps
    signatures_expired: AtomicU64,
    /// Jobs handed to the dispatch pool
    jobs_submitted: AtomicU64,
    /// Jobs the publisher accepted
    jobs_published: AtomicU64,
    /// Jobs the publisher rejected or panicked on
    publish_failures: AtomicU64,
    /// Jobs dropped because the pool was shutting down
    jobs_abandoned: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_triggered(&self) {
        self.inner.events_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttled(&self) {
        self.inner.events_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expired(&self, count: usize) {
        self.inner
            .signatures_expired
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_submitted(&self) {
        self.inner.jobs_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        self.inner.jobs_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_publish_failure(&self) {
        self.inner.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self) {
        self.inner.jobs_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the total number of events that passed the throttle.
    pub fn events_triggered(&self) -> u64 {
        self.inner.events_triggered.load(Ordering::Relaxed)
    }

    /// Get the total number of events suppressed as duplicates.
    pub fn events_throttled(&self) -> u64 {
        self.inner.events_throttled.load(Ordering::Relaxed)
    }

    /// Get the total number of cache entries removed by expiry sweeps.
    pub fn signatures_expired(&self) -> u64 {
        self.inner.signatures_expired.load(Ordering::Relaxed)
    }

    /// Get the total number of jobs handed to the dispatch pool.
    pub fn jobs_submitted(&self) -> u64 {
        self.inner.jobs_submitted.load(Ordering::Relaxed)
    }

    /// Get the total number of successfully published jobs.
    pub fn jobs_published(&self) -> u64 {
        self.inner.jobs_published.load(Ordering::Relaxed)
    }

    /// Get the total number of failed publish attempts.
    pub fn publish_failures(&self) -> u64 {
        self.inner.publish_failures.load(Ordering::Relaxed)
    }

    /// Get the total number of jobs abandoned at shutdown.
    pub fn jobs_abandoned(&self) -> u64 {
        self.inner.jobs_abandoned.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_triggered: self.events_triggered(),
            events_throttled: self.events_throttled(),
            signatures_expired: self.signatures_expired(),
            jobs_submitted: self.jobs_submitted(),
            jobs_published: self.jobs_published(),
            publish_failures: self.publish_failures(),
            jobs_abandoned: self.jobs_abandoned(),
        }
    }

    /// Reset all metrics to zero.
    ///
    /// Useful for testing or when starting a new monitoring period.
    pub fn reset(&self) {
        self.inner.events_triggered.store(0, Ordering::Relaxed);
        self.inner.events_throttled.store(0, Ordering::Relaxed);
        self.inner.signatures_expired.store(0, Ordering::Relaxed);
        self.inner.jobs_submitted.store(0, Ordering::Relaxed);
        self.inner.jobs_published.store(0, Ordering::Relaxed);
        self.inner.publish_failures.store(0, Ordering::Relaxed);
        self.inner.jobs_abandoned.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Events that passed the throttle
    pub events_triggered: u64,
    /// Events suppressed as duplicates
    pub events_throttled: u64,
    /// Cache entries removed by expiry sweeps
    pub signatures_expired: u64,
    /// Jobs handed to the dispatch pool
    pub jobs_submitted: u64,
    /// Jobs the publisher accepted
    pub jobs_published: u64,
    /// Jobs the publisher rejected
    pub publish_failures: u64,
    /// Jobs dropped at shutdown
    pub jobs_abandoned: u64,
}

impl MetricsSnapshot {
    /// Calculate the throttle rate (0.0 to 1.0).
    ///
    /// Returns the ratio of throttled events to evaluated events.
    /// Returns 0.0 if no events have been evaluated.
    pub fn throttle_rate(&self) -> f64 {
        let total = self.total_events();
        if total == 0 {
            0.0
        } else {
            self.events_throttled as f64 / total as f64
        }
    }

    /// Get the total number of evaluated events (triggered + throttled).
    pub fn total_events(&self) -> u64 {
        self.events_triggered.saturating_add(self.events_throttled)
    }

    /// Jobs submitted but not yet published, failed, or abandoned.
    pub fn jobs_pending(&self) -> u64 {
        self.jobs_submitted.saturating_sub(
            self.jobs_published
                .saturating_add(self.publish_failures)
                .saturating_add(self.jobs_abandoned),
        )
    }
}
