//! Tracing integration layer.
//!
//! Provides a `tracing_subscriber::Layer` that forwards selected events to a
//! pub/sub topic. Every event at or above the threshold is turned into a
//! `LogRecord`, checked against the evaluator, rendered, and handed to the
//! dispatch pool. The logging thread never waits on the network, only on a
//! free worker when the pool is saturated.

use crate::application::{
    config::{parse_properties, AppenderOptions, ThrottleSettings},
    dispatch::{
        is_dispatch_worker, DispatchJob, DispatchPool, JobHandle, PoolConfig, ShutdownTimeout,
    },
    evaluator::{Evaluator, ThrottlingEvaluator},
    metrics::Metrics,
    ports::{Clock, PublishError, Publisher, Renderer},
};
use crate::domain::{
    record::LogRecord,
    topic::TopicHandle,
    truncate::{truncate_owned, SUBJECT_LIMIT},
};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::layout::JsonLayout;
use crate::infrastructure::visitor::EventVisitor;

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Level, Subscriber};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::Context, Layer};

/// Events from this crate's own modules are never forwarded.
const INTERNAL_TARGET: &str = "tracing_notifier";

/// Default time `close` waits for the last publish and for the pool.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Error returned when building a `NotificationLayer` fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// No publisher was configured
    MissingPublisher,
    /// Neither a topic handle nor a topic name was configured
    MissingTopic,
    /// No topic visible to the publisher has this name
    UnknownTopic(String),
    /// Listing topics failed
    TopicLookup(PublishError),
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MissingPublisher => write!(f, "a publisher is required"),
            BuildError::MissingTopic => write!(f, "a topic or topic name is required"),
            BuildError::UnknownTopic(name) => write!(f, "no topic named {:?}", name),
            BuildError::TopicLookup(e) => write!(f, "topic lookup failed: {}", e),
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::TopicLookup(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PublishError> for BuildError {
    fn from(e: PublishError) -> Self {
        BuildError::TopicLookup(e)
    }
}

#[derive(Debug, Clone)]
enum TopicSource {
    Handle(TopicHandle),
    Name(String),
}

/// What `append` did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The layer is closed
    Inactive,
    /// The record was raised on a dispatch worker thread
    DispatchWorker,
    /// The record is more verbose than the threshold
    BelowThreshold,
    /// The evaluator suppressed the record
    Throttled,
    /// A publish job was submitted
    Submitted,
}

/// Builder for constructing a `NotificationLayer`.
pub struct NotificationLayerBuilder {
    publisher: Option<Arc<dyn Publisher>>,
    topic: Option<TopicSource>,
    subject: Option<String>,
    evaluator: Option<Arc<dyn Evaluator>>,
    evaluator_options: Option<BTreeMap<String, String>>,
    layout: Option<Arc<dyn Renderer>>,
    pool_config: PoolConfig,
    threshold: Level,
    clock: Option<Arc<dyn Clock>>,
    close_timeout: Duration,
}

impl NotificationLayerBuilder {
    fn new() -> Self {
        Self {
            publisher: None,
            topic: None,
            subject: None,
            evaluator: None,
            evaluator_options: None,
            layout: None,
            pool_config: PoolConfig::default(),
            threshold: Level::TRACE,
            clock: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Set the messaging client.
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Publish to the topic with this short name.
    ///
    /// The name is resolved at build time by listing the publisher's topics
    /// and matching the segment after the last `:` of each identifier.
    pub fn with_topic_name(mut self, name: impl Into<String>) -> Self {
        self.topic = Some(TopicSource::Name(name.into()));
        self
    }

    /// Publish to this topic.
    pub fn with_topic(mut self, topic: TopicHandle) -> Self {
        self.topic = Some(TopicSource::Handle(topic));
        self
    }

    /// Subject attached to every message, cut to 100 bytes.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Use a custom evaluator instead of the throttling evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Configure the evaluator from properties-style text.
    pub fn with_evaluator_properties(mut self, properties: &str) -> Self {
        self.evaluator_options = Some(parse_properties(properties));
        self
    }

    /// Configure the evaluator from a flat option map.
    pub fn with_evaluator_options(mut self, options: BTreeMap<String, String>) -> Self {
        self.evaluator_options = Some(options);
        self
    }

    /// Set the renderer. Defaults to `JsonLayout`.
    pub fn with_layout(mut self, layout: Arc<dyn Renderer>) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Set the dispatch pool sizing.
    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Forward only events at `threshold` or more severe.
    ///
    /// Defaults to `TRACE`, which forwards every level.
    pub fn with_threshold(mut self, threshold: Level) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the clock used by the default evaluator.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// How long `close` waits for outstanding publishes.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Apply options read from a flat configuration map.
    ///
    /// Options left unset keep the builder's current values.
    pub fn with_options(mut self, options: AppenderOptions) -> Self {
        if let Some(name) = options.topic_name {
            self.topic = Some(TopicSource::Name(name));
        }
        if let Some(subject) = options.topic_subject {
            self.subject = Some(subject);
        }
        if let Some(properties) = options.evaluator_properties {
            self.evaluator_options = Some(parse_properties(&properties));
        }
        if let Some(min) = options.pool_min {
            self.pool_config = self.pool_config.with_min_workers(min);
        }
        if let Some(max) = options.pool_max {
            self.pool_config = self.pool_config.with_max_workers(max);
        }
        if let Some(threshold) = options.threshold {
            self.threshold = threshold;
        }
        self
    }

    /// Build the layer.
    ///
    /// # Errors
    /// Returns `BuildError` if the publisher or topic is missing, or the topic
    /// name cannot be resolved.
    pub fn build(self) -> Result<NotificationLayer, BuildError> {
        let publisher = self.publisher.ok_or(BuildError::MissingPublisher)?;
        let topic = match self.topic.ok_or(BuildError::MissingTopic)? {
            TopicSource::Handle(topic) => topic,
            TopicSource::Name(name) => resolve_topic(publisher.as_ref(), &name)?,
        };

        let metrics = Metrics::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));

        let (evaluator, counts_decisions): (Arc<dyn Evaluator>, bool) = match self.evaluator {
            Some(evaluator) => {
                if let Some(options) = &self.evaluator_options {
                    for error in evaluator.configure(options) {
                        tracing::warn!(%error, "evaluator rejected option");
                    }
                }
                (evaluator, false)
            }
            None => {
                let settings = match &self.evaluator_options {
                    Some(options) => ThrottleSettings::from_options(options).0,
                    None => ThrottleSettings::default(),
                };
                let evaluator = ThrottlingEvaluator::with_clock(settings, clock, metrics.clone());
                (Arc::new(evaluator), true)
            }
        };

        let layout = self
            .layout
            .unwrap_or_else(|| Arc::new(JsonLayout::new()));
        let pool = DispatchPool::new(self.pool_config, publisher, metrics.clone());

        tracing::debug!(%topic, threshold = %self.threshold, "notification layer ready");

        Ok(NotificationLayer {
            evaluator,
            evaluator_counts: counts_decisions,
            layout,
            pool: Arc::new(pool),
            topic,
            subject: self.subject.map(|s| truncate_owned(s, SUBJECT_LIMIT)),
            threshold: self.threshold,
            metrics,
            close_timeout: self.close_timeout,
            last_handle: Arc::new(Mutex::new(None)),
            active: Arc::new(AtomicBool::new(true)),
        })
    }
}

fn resolve_topic(publisher: &dyn Publisher, name: &str) -> Result<TopicHandle, BuildError> {
    publisher
        .list_topics()?
        .into_iter()
        .find(|topic| topic.name() == name)
        .ok_or_else(|| BuildError::UnknownTopic(name.to_string()))
}

/// A `tracing` layer that publishes throttled notifications.
///
/// Clones share the evaluator, the pool, and the open/closed state.
#[derive(Clone)]
pub struct NotificationLayer {
    evaluator: Arc<dyn Evaluator>,
    // The default evaluator updates the metrics itself.
    evaluator_counts: bool,
    layout: Arc<dyn Renderer>,
    pool: Arc<DispatchPool>,
    topic: TopicHandle,
    subject: Option<String>,
    threshold: Level,
    metrics: Metrics,
    close_timeout: Duration,
    last_handle: Arc<Mutex<Option<JobHandle>>>,
    active: Arc<AtomicBool>,
}

impl fmt::Debug for NotificationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationLayer")
            .field("topic", &self.topic)
            .field("subject", &self.subject)
            .field("threshold", &self.threshold)
            .field("evaluator", &self.evaluator)
            .field("pool", &self.pool)
            .field("active", &self.is_active())
            .finish()
    }
}

impl NotificationLayer {
    /// Create a builder.
    pub fn builder() -> NotificationLayerBuilder {
        NotificationLayerBuilder::new()
    }

    /// Run `record` through threshold, evaluator, layout, and pool.
    pub fn append(&self, record: &LogRecord) -> AppendOutcome {
        if !self.is_active() {
            return AppendOutcome::Inactive;
        }
        if is_dispatch_worker() {
            return AppendOutcome::DispatchWorker;
        }
        if let Ok(level) = record.level.parse::<Level>() {
            if level > self.threshold {
                return AppendOutcome::BelowThreshold;
            }
        }

        let triggering = self.evaluator.is_triggering(record);
        if !self.evaluator_counts {
            if triggering {
                self.metrics.record_triggered();
            } else {
                self.metrics.record_throttled();
            }
        }
        if !triggering {
            return AppendOutcome::Throttled;
        }

        let message = self.layout.render(record);
        let job = DispatchJob::new(self.topic.clone(), message, self.subject.clone());
        let handle = self.pool.submit(job);
        *self.last_handle.lock() = Some(handle);
        AppendOutcome::Submitted
    }

    /// Stop forwarding and drain the pool.
    ///
    /// Waits for the most recent publish, then shuts the pool down, both
    /// within one close timeout. Calling `close` again is a no-op.
    ///
    /// # Errors
    /// Returns `ShutdownTimeout` if publishes were still running at the
    /// deadline; those events might be lost.
    pub fn close(&self) -> Result<(), ShutdownTimeout> {
        if !self.active.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let deadline = Instant::now() + self.close_timeout;
        let last = self.last_handle.lock().take();
        if let Some(mut handle) = last {
            if handle.wait_timeout(self.close_timeout).is_none() {
                tracing::warn!(
                    timeout = ?self.close_timeout,
                    "last notification still running at close, some events might be lost"
                );
            }
        }
        self.pool
            .shutdown(deadline.saturating_duration_since(Instant::now()))
    }

    /// Check whether the layer still forwards events.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Destination topic.
    pub fn topic(&self) -> &TopicHandle {
        &self.topic
    }

    /// Subject attached to messages, already truncated.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Most verbose level forwarded.
    pub fn threshold(&self) -> Level {
        self.threshold
    }

    /// The evaluator in use.
    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// The dispatch pool.
    pub fn pool(&self) -> &DispatchPool {
        &self.pool
    }

    /// Shared metrics for decisions and dispatch.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn record_from_event<S>(&self, event: &tracing::Event<'_>, ctx: &Context<'_, S>) -> LogRecord
    where
        S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    {
        let metadata = event.metadata();
        let mut visitor = EventVisitor::new();
        event.record(&mut visitor);
        let collected = visitor.into_fields();

        let mut record = LogRecord::new(
            metadata.level().as_str(),
            metadata.target(),
            collected.message.unwrap_or_default(),
        );
        record.thread_name = std::thread::current().name().map(str::to_string);
        record.file = metadata.file().map(str::to_string);
        record.class_name = metadata.module_path().map(str::to_string);
        record.method_name = ctx.event_span(event).map(|span| span.name().to_string());
        record.line = metadata.line();
        record.stack_trace = collected.stack_trace;
        record.fields = collected.fields;
        record
    }
}

fn is_internal(target: &str) -> bool {
    target
        .strip_prefix(INTERNAL_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

impl<S> Layer<S> for NotificationLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal(metadata.target())
            || !self.is_active()
            || *metadata.level() > self.threshold
            || is_dispatch_worker()
        {
            return;
        }
        let record = self.record_from_event(event, &ctx);
        self.append(&record);
    }
}
