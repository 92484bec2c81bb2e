//! Throttling evaluator.
//!
//! Decides whether a log record should trigger a notification. A record
//! triggers when its signature has not been seen within the retention period;
//! repeats inside the window are throttled.
//!
//! The mask and the cache are held together in an immutable snapshot.
//! Reconfiguration builds a fresh snapshot with an empty cache and swaps it in
//! atomically, so an in-flight decision always sees one consistent pair.

use crate::application::cache::DedupCache;
use crate::application::config::{parse_properties, ConfigError, ThrottleSettings};
use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::domain::{record::LogRecord, signature::Signature};
use crate::infrastructure::clock::SystemClock;
use arc_swap::ArcSwap;
use std::collections::BTreeMap;
use std::panic;
use std::sync::Arc;

/// Decides whether a record should be forwarded.
///
/// The facade consults an `Evaluator` for every record that passes the level
/// threshold. Implementations must be cheap and must not block.
pub trait Evaluator: Send + Sync + std::fmt::Debug {
    /// Return true if `record` should be published.
    fn is_triggering(&self, record: &LogRecord) -> bool;

    /// Apply flat key/value options. The default ignores them.
    fn configure(&self, options: &BTreeMap<String, String>) -> Vec<ConfigError> {
        let _ = options;
        Vec::new()
    }
}

/// Outcome of evaluating one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// First occurrence in the window; publish it
    Trigger,
    /// Repeat inside the window; drop it
    Throttle,
}

#[derive(Debug)]
struct Throttle {
    settings: ThrottleSettings,
    cache: DedupCache,
}

/// Evaluator that forwards each distinct signature once per retention period.
///
/// # Example
/// ```
/// use tracing_notifier::application::evaluator::ThrottlingEvaluator;
/// use tracing_notifier::domain::record::LogRecord;
///
/// let evaluator = ThrottlingEvaluator::from_properties("period=5\nunit=SECONDS");
/// let record = LogRecord::new("ERROR", "app::db", "connection refused").with_line(12);
///
/// assert!(evaluator.should_trigger(&record));
/// assert!(!evaluator.should_trigger(&record));
/// ```
#[derive(Debug)]
pub struct ThrottlingEvaluator {
    active: ArcSwap<Throttle>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl ThrottlingEvaluator {
    /// Create an evaluator with default settings (ten minutes, logger + line).
    pub fn new() -> Self {
        Self::with_settings(ThrottleSettings::default())
    }

    /// Create an evaluator with explicit settings and the system clock.
    pub fn with_settings(settings: ThrottleSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock::new()), Metrics::new())
    }

    /// Create an evaluator with an injected clock and metrics sink.
    pub fn with_clock(settings: ThrottleSettings, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        let throttle = build_throttle(settings, &clock, &metrics);
        Self {
            active: ArcSwap::from_pointee(throttle),
            clock,
            metrics,
        }
    }

    /// Create an evaluator from a flat option map.
    ///
    /// Invalid options are logged and fall back to their defaults.
    pub fn from_options(options: &BTreeMap<String, String>) -> Self {
        let (settings, _errors) = ThrottleSettings::from_options(options);
        Self::with_settings(settings)
    }

    /// Create an evaluator from properties-style text.
    pub fn from_properties(text: &str) -> Self {
        Self::from_options(&parse_properties(text))
    }

    /// Evaluate `record` against the current snapshot.
    ///
    /// Fails open: if the cache panics, the record triggers.
    pub fn evaluate(&self, record: &LogRecord) -> ThrottleDecision {
        let throttle = self.active.load();
        let signature = Signature::build(record, throttle.settings.mask);

        let observed =
            panic::catch_unwind(panic::AssertUnwindSafe(|| throttle.cache.observe(signature)));
        let decision = match observed {
            Ok(true) => ThrottleDecision::Trigger,
            Ok(false) => ThrottleDecision::Throttle,
            Err(_) => {
                tracing::error!("dedup cache panicked, letting record through");
                ThrottleDecision::Trigger
            }
        };

        match decision {
            ThrottleDecision::Trigger => self.metrics.record_triggered(),
            ThrottleDecision::Throttle => self.metrics.record_throttled(),
        }
        decision
    }

    /// Return true if `record` is the first of its signature in the window.
    pub fn should_trigger(&self, record: &LogRecord) -> bool {
        self.evaluate(record) == ThrottleDecision::Trigger
    }

    /// The signature `record` has under the current mask.
    pub fn signature(&self, record: &LogRecord) -> Signature {
        Signature::build(record, self.active.load().settings.mask)
    }

    /// Replace the settings and start over with an empty cache.
    pub fn reconfigure(&self, settings: ThrottleSettings) {
        let throttle = build_throttle(settings, &self.clock, &self.metrics);
        self.active.store(Arc::new(throttle));
        tracing::debug!(
            period = ?settings.retention.period(),
            mask = %settings.mask,
            "throttling evaluator reconfigured"
        );
    }

    /// Parse `options` and reconfigure, returning the rejected values.
    pub fn apply_options(&self, options: &BTreeMap<String, String>) -> Vec<ConfigError> {
        let (settings, errors) = ThrottleSettings::from_options(options);
        self.reconfigure(settings);
        errors
    }

    /// The settings currently in effect.
    pub fn settings(&self) -> ThrottleSettings {
        self.active.load().settings
    }

    /// Number of signatures currently held in the cache.
    pub fn tracked_signatures(&self) -> usize {
        self.active.load().cache.len()
    }

    /// Sweep expired signatures from the current cache.
    pub fn purge_expired(&self) -> usize {
        self.active.load().cache.purge_expired()
    }

    /// Metrics shared with this evaluator.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

impl Default for ThrottlingEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for ThrottlingEvaluator {
    fn is_triggering(&self, record: &LogRecord) -> bool {
        self.should_trigger(record)
    }

    fn configure(&self, options: &BTreeMap<String, String>) -> Vec<ConfigError> {
        self.apply_options(options)
    }
}

fn build_throttle(settings: ThrottleSettings, clock: &Arc<dyn Clock>, metrics: &Metrics) -> Throttle {
    Throttle {
        settings,
        cache: DedupCache::with_default_storage(
            Arc::clone(clock),
            settings.retention,
            metrics.clone(),
        ),
    }
}
