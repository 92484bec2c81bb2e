//! Bounded dispatch pool for publish jobs.
//!
//! Jobs are handed to workers through a zero-capacity channel, so a job is
//! only accepted when a worker is ready to run it. When no worker is idle the
//! pool grows up to `max_workers`; past that the submitter waits for the next
//! free worker. Nothing is queued and nothing is dropped: each job ends as
//! `Published`, `Failed`, or `Abandoned`.
//!
//! Workers are plain named threads. They are never joined, so a process can
//! exit while a publish is still running.

use crate::application::metrics::Metrics;
use crate::application::ports::{PublishError, Publisher};
use crate::domain::topic::TopicHandle;
use crate::domain::truncate::{truncate_owned, MESSAGE_LIMIT, SUBJECT_LIMIT};
use crossbeam_channel::{
    bounded, select, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError,
    TrySendError,
};
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::fmt;
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How often a blocked submitter re-checks pool growth and lifecycle.
pub const HANDOFF_POLL: Duration = Duration::from_millis(50);

/// Prefix of worker thread names.
pub const WORKER_NAME_PREFIX: &str = "notifier-dispatch-";

/// Sizing of the dispatch pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    min_workers: usize,
    max_workers: usize,
    keep_alive: Duration,
}

impl PoolConfig {
    /// Workers kept alive even when idle.
    pub fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        self
    }

    /// Upper bound on concurrent workers.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Idle time after which a worker above the minimum retires.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// A pool that grows without limit.
    pub fn unbounded() -> Self {
        Self {
            min_workers: 0,
            max_workers: usize::MAX,
            keep_alive: Duration::from_secs(60),
        }
    }

    /// Minimum worker count.
    pub fn min_workers(&self) -> usize {
        self.min_workers
    }

    /// Maximum worker count.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Worker idle timeout.
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Check the sizing constraints.
    ///
    /// # Errors
    /// Returns `PoolInitError` if `max_workers` is zero or below
    /// `min_workers`, or if `keep_alive` is zero.
    pub fn validate(&self) -> Result<(), PoolInitError> {
        if self.max_workers == 0 {
            return Err(PoolInitError::ZeroMaxWorkers);
        }
        if self.keep_alive.is_zero() {
            return Err(PoolInitError::ZeroKeepAlive);
        }
        if self.min_workers > self.max_workers {
            return Err(PoolInitError::MinExceedsMax {
                min: self.min_workers,
                max: self.max_workers,
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    /// No resident workers, at most ten, sixty second keep-alive.
    fn default() -> Self {
        Self {
            min_workers: 0,
            max_workers: 10,
            keep_alive: Duration::from_secs(60),
        }
    }
}

/// Error building a dispatch pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolInitError {
    /// `max_workers` was zero
    ZeroMaxWorkers,
    /// `keep_alive` was zero, which would spin idle resident workers
    ZeroKeepAlive,
    /// `min_workers` exceeded `max_workers`
    MinExceedsMax {
        /// Requested minimum
        min: usize,
        /// Requested maximum
        max: usize,
    },
    /// The OS refused to start a resident worker
    SpawnFailed(String),
}

impl fmt::Display for PoolInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolInitError::ZeroMaxWorkers => write!(f, "max_workers must be greater than 0"),
            PoolInitError::ZeroKeepAlive => write!(f, "keep_alive must be greater than 0"),
            PoolInitError::MinExceedsMax { min, max } => {
                write!(f, "min_workers ({}) exceeds max_workers ({})", min, max)
            }
            PoolInitError::SpawnFailed(reason) => write!(f, "failed to start worker: {}", reason),
        }
    }
}

impl std::error::Error for PoolInitError {}

/// Jobs were still running when the shutdown grace period ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeout {
    /// Jobs still executing at the deadline
    pub in_flight: usize,
}

impl fmt::Display for ShutdownTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} publish job(s) still running at shutdown, events might be lost",
            self.in_flight
        )
    }
}

impl std::error::Error for ShutdownTimeout {}

/// One message to publish.
///
/// Message and subject are cut to the transport limits on construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchJob {
    topic: TopicHandle,
    message: String,
    subject: Option<String>,
}

impl DispatchJob {
    /// Create a job, truncating message and subject to their byte limits.
    pub fn new(topic: TopicHandle, message: impl Into<String>, subject: Option<String>) -> Self {
        Self {
            topic,
            message: truncate_owned(message.into(), MESSAGE_LIMIT),
            subject: subject.map(|s| truncate_owned(s, SUBJECT_LIMIT)),
        }
    }

    /// Target topic.
    pub fn topic(&self) -> &TopicHandle {
        &self.topic
    }

    /// Message body.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Optional subject.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The publisher accepted the message
    Published,
    /// The publisher returned an error or panicked
    Failed(PublishError),
    /// The pool stopped before the job ran
    Abandoned,
}

/// Handle to a submitted job.
#[derive(Debug)]
pub struct JobHandle {
    rx: Receiver<JobOutcome>,
    resolved: Option<JobOutcome>,
}

impl JobHandle {
    fn new(rx: Receiver<JobOutcome>) -> Self {
        Self { rx, resolved: None }
    }

    fn resolve(&mut self, outcome: JobOutcome) -> JobOutcome {
        self.resolved = Some(outcome.clone());
        outcome
    }

    /// Block until the job ends.
    pub fn wait(mut self) -> JobOutcome {
        if let Some(outcome) = self.resolved.take() {
            return outcome;
        }
        self.rx.recv().unwrap_or(JobOutcome::Abandoned)
    }

    /// Wait up to `timeout` for the job to end.
    ///
    /// Returns `None` if it is still running at the deadline.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<JobOutcome> {
        if let Some(outcome) = &self.resolved {
            return Some(outcome.clone());
        }
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(self.resolve(outcome)),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.resolve(JobOutcome::Abandoned)),
        }
    }

    /// The outcome, if the job has already ended.
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        if let Some(outcome) = &self.resolved {
            return Some(outcome.clone());
        }
        match self.rx.try_recv() {
            Ok(outcome) => Some(self.resolve(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.resolve(JobOutcome::Abandoned)),
        }
    }
}

/// Lifecycle of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting jobs
    Running,
    /// Refusing jobs, waiting for in-flight ones
    ShuttingDown,
    /// Done
    Stopped,
}

struct Envelope {
    job: DispatchJob,
    reply: Sender<JobOutcome>,
}

impl Envelope {
    fn finish(self, outcome: JobOutcome) {
        // The handle may have been dropped; nobody is waiting then.
        let _ = self.reply.send(outcome);
    }
}

#[derive(Debug)]
struct PoolInner {
    lifecycle: PoolState,
    live: usize,
    busy: usize,
}

struct Shared {
    config: PoolConfig,
    publisher: Arc<dyn Publisher>,
    metrics: Metrics,
    inner: Mutex<PoolInner>,
    idle: Condvar,
    jobs: Receiver<Envelope>,
    // Dropping the sender wakes every idle worker.
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
    next_worker_id: AtomicUsize,
}

impl Shared {
    fn lifecycle(&self) -> PoolState {
        self.inner.lock().lifecycle
    }

    fn execute(&self, envelope: Envelope) {
        self.inner.lock().busy += 1;

        let outcome = if self.lifecycle() != PoolState::Running {
            self.metrics.record_abandoned();
            JobOutcome::Abandoned
        } else {
            self.publish(&envelope.job)
        };
        envelope.finish(outcome);

        let mut inner = self.inner.lock();
        inner.busy -= 1;
        drop(inner);
        self.idle.notify_all();
    }

    fn publish(&self, job: &DispatchJob) -> JobOutcome {
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            self.publisher
                .publish(job.topic(), job.message(), job.subject())
        }));
        let result = match result {
            Ok(result) => result,
            Err(_) => Err(PublishError::new("publisher panicked")),
        };

        match result {
            Ok(()) => {
                self.metrics.record_published();
                JobOutcome::Published
            }
            Err(error) => {
                self.metrics.record_publish_failure();
                tracing::error!(topic = %job.topic(), %error, "could not publish notification");
                JobOutcome::Failed(error)
            }
        }
    }

    /// Retire this worker if the pool is above its minimum.
    fn try_retire(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.live > self.config.min_workers {
            inner.live -= 1;
            true
        } else {
            false
        }
    }

    fn worker_exited(&self) {
        let mut inner = self.inner.lock();
        inner.live = inner.live.saturating_sub(1);
        drop(inner);
        self.idle.notify_all();
    }
}

thread_local! {
    static ON_DISPATCH_WORKER: Cell<bool> = Cell::new(false);
}

/// Check whether the current thread is a dispatch worker.
///
/// Events raised while a worker runs a publish (retry warnings from a
/// messaging client, for example) must not be submitted back to a pool: with
/// every worker busy, the worker would wait on itself.
pub fn is_dispatch_worker() -> bool {
    ON_DISPATCH_WORKER.with(Cell::get)
}

fn run_worker(shared: Arc<Shared>) {
    ON_DISPATCH_WORKER.with(|flag| flag.set(true));
    tracing::trace!("dispatch worker started");
    loop {
        select! {
            recv(shared.jobs) -> msg => match msg {
                Ok(envelope) => shared.execute(envelope),
                Err(_) => break,
            },
            recv(shared.stop_rx) -> _ => break,
            default(shared.config.keep_alive) => {
                if shared.try_retire() {
                    tracing::trace!("idle dispatch worker retired");
                    return;
                }
            }
        }
    }
    shared.worker_exited();
    tracing::trace!("dispatch worker stopped");
}

/// Worker pool that runs publish jobs off the logging thread.
pub struct DispatchPool {
    shared: Arc<Shared>,
    jobs: Sender<Envelope>,
}

impl fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("DispatchPool")
            .field("config", &self.shared.config)
            .field("state", &inner.lifecycle)
            .field("live", &inner.live)
            .field("busy", &inner.busy)
            .finish()
    }
}

impl DispatchPool {
    /// Create a pool, falling back to an unbounded pool if `config` is
    /// unusable.
    pub fn new(config: PoolConfig, publisher: Arc<dyn Publisher>, metrics: Metrics) -> Self {
        match Self::try_new(config, Arc::clone(&publisher), metrics.clone()) {
            Ok(pool) => pool,
            Err(error) => {
                tracing::warn!(%error, "dispatch pool misconfigured, using an unbounded pool");
                Self::build(PoolConfig::unbounded(), publisher, metrics)
            }
        }
    }

    /// Create a pool and start `min_workers` resident workers.
    ///
    /// # Errors
    /// Returns `PoolInitError` for invalid sizing or a failed worker spawn.
    pub fn try_new(
        config: PoolConfig,
        publisher: Arc<dyn Publisher>,
        metrics: Metrics,
    ) -> Result<Self, PoolInitError> {
        config.validate()?;
        let pool = Self::build(config, publisher, metrics);
        for _ in 0..config.min_workers {
            pool.shared.inner.lock().live += 1;
            if let Err(err) = pool.spawn_worker() {
                pool.shared.inner.lock().live -= 1;
                return Err(PoolInitError::SpawnFailed(err.to_string()));
            }
        }
        Ok(pool)
    }

    fn build(config: PoolConfig, publisher: Arc<dyn Publisher>, metrics: Metrics) -> Self {
        let (jobs_tx, jobs_rx) = bounded(0);
        let (stop_tx, stop_rx) = bounded(0);
        let shared = Arc::new(Shared {
            config,
            publisher,
            metrics,
            inner: Mutex::new(PoolInner {
                lifecycle: PoolState::Running,
                live: 0,
                busy: 0,
            }),
            idle: Condvar::new(),
            jobs: jobs_rx,
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            next_worker_id: AtomicUsize::new(1),
        });
        Self {
            shared,
            jobs: jobs_tx,
        }
    }

    /// Start a worker. The caller has already counted it in `live`.
    fn spawn_worker(&self) -> std::io::Result<()> {
        let id = self.shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(format!("{}{}", WORKER_NAME_PREFIX, id))
            .spawn(move || run_worker(shared))
            .map(drop)
    }

    /// Hand `job` to a worker.
    ///
    /// Returns once a worker has accepted the job or the pool has stopped
    /// accepting work. Blocks while every worker is busy and the pool is at
    /// `max_workers`. Called from a dispatch worker it waits one poll interval
    /// at most, then abandons the job.
    pub fn submit(&self, job: DispatchJob) -> JobHandle {
        let (reply_tx, reply_rx) = bounded(1);
        let handle = JobHandle::new(reply_rx);
        let mut envelope = Envelope {
            job,
            reply: reply_tx,
        };
        self.shared.metrics.record_submitted();

        if self.shared.lifecycle() != PoolState::Running {
            self.abandon(envelope);
            return handle;
        }

        match self.jobs.try_send(envelope) {
            Ok(()) => return handle,
            Err(TrySendError::Full(returned)) => envelope = returned,
            Err(TrySendError::Disconnected(returned)) => {
                self.abandon(returned);
                return handle;
            }
        }

        loop {
            if !self.grow_if_saturated() {
                self.abandon(envelope);
                return handle;
            }
            match self.jobs.send_timeout(envelope, HANDOFF_POLL) {
                Ok(()) => return handle,
                Err(SendTimeoutError::Timeout(returned)) if is_dispatch_worker() => {
                    self.abandon(returned);
                    return handle;
                }
                Err(SendTimeoutError::Timeout(returned)) => envelope = returned,
                Err(SendTimeoutError::Disconnected(returned)) => {
                    self.abandon(returned);
                    return handle;
                }
            }
        }
    }

    /// Start one more worker if all live workers are busy and there is room.
    ///
    /// Returns false if the pool is no longer running.
    fn grow_if_saturated(&self) -> bool {
        let mut inner = self.shared.inner.lock();
        if inner.lifecycle != PoolState::Running {
            return false;
        }
        if inner.live < self.shared.config.max_workers && inner.live == inner.busy {
            inner.live += 1;
            drop(inner);
            if let Err(error) = self.spawn_worker() {
                self.shared.inner.lock().live -= 1;
                tracing::warn!(%error, "could not start dispatch worker");
            }
        }
        true
    }

    fn abandon(&self, envelope: Envelope) {
        self.shared.metrics.record_abandoned();
        tracing::debug!(topic = %envelope.job.topic(), "dispatch pool not running, job abandoned");
        envelope.finish(JobOutcome::Abandoned);
    }

    /// Stop accepting jobs and wait up to `grace` for running ones.
    ///
    /// Idle workers exit immediately. Busy workers finish their current job
    /// and exit; jobs they receive afterwards resolve as `Abandoned`.
    ///
    /// # Errors
    /// Returns `ShutdownTimeout` if jobs were still running at the deadline.
    pub fn shutdown(&self, grace: Duration) -> Result<(), ShutdownTimeout> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.lifecycle == PoolState::Stopped {
                return Ok(());
            }
            inner.lifecycle = PoolState::ShuttingDown;
        }
        tracing::debug!("dispatch pool shutting down");
        self.shared.stop_tx.lock().take();

        let deadline = Instant::now() + grace;
        let mut inner = self.shared.inner.lock();
        while inner.busy > 0 {
            if self.shared.idle.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        let in_flight = inner.busy;
        inner.lifecycle = PoolState::Stopped;
        drop(inner);

        if in_flight > 0 {
            let timeout = ShutdownTimeout { in_flight };
            tracing::warn!(in_flight, "{}", timeout);
            return Err(timeout);
        }
        tracing::debug!("dispatch pool stopped");
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        self.shared.lifecycle()
    }

    /// Number of live worker threads.
    pub fn live_workers(&self) -> usize {
        self.shared.inner.lock().live
    }

    /// Number of workers currently running a job.
    pub fn busy_workers(&self) -> usize {
        self.shared.inner.lock().busy
    }

    /// The sizing in effect.
    pub fn config(&self) -> PoolConfig {
        self.shared.config
    }

    /// Metrics shared with this pool.
    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::{FailingPublisher, RecordingPublisher};

    fn topic() -> TopicHandle {
        TopicHandle::new("arn:aws:sns:eu-west-1:123456789012:alerts")
    }

    fn job(message: &str) -> DispatchJob {
        DispatchJob::new(topic(), message, Some("subject".to_string()))
    }

    #[test]
    fn test_job_truncates_payload() {
        let long_subject = "s".repeat(250);
        let long_message = "m".repeat(MESSAGE_LIMIT + 10);
        let job = DispatchJob::new(topic(), long_message, Some(long_subject));

        assert_eq!(job.message().len(), MESSAGE_LIMIT);
        assert_eq!(job.subject().map(str::len), Some(SUBJECT_LIMIT));
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(PoolConfig::default().validate(), Ok(()));
        assert_eq!(
            PoolConfig::default().with_max_workers(0).validate(),
            Err(PoolInitError::ZeroMaxWorkers)
        );
        assert_eq!(
            PoolConfig::default()
                .with_min_workers(5)
                .with_max_workers(2)
                .validate(),
            Err(PoolInitError::MinExceedsMax { min: 5, max: 2 })
        );
        assert_eq!(
            PoolConfig::default()
                .with_min_workers(1)
                .with_keep_alive(Duration::ZERO)
                .validate(),
            Err(PoolInitError::ZeroKeepAlive)
        );
    }

    #[derive(Debug)]
    struct Resubmitting {
        pool: Mutex<Option<Arc<DispatchPool>>>,
        nested: Mutex<Vec<JobOutcome>>,
        saw_worker_flag: Mutex<Vec<bool>>,
    }

    impl Publisher for Resubmitting {
        fn publish(
            &self,
            _topic: &TopicHandle,
            message: &str,
            _subject: Option<&str>,
        ) -> Result<(), PublishError> {
            self.saw_worker_flag.lock().push(is_dispatch_worker());
            if message == "outer" {
                let pool = self.pool.lock().clone();
                if let Some(pool) = pool {
                    let outcome = pool.submit(job("inner")).wait();
                    self.nested.lock().push(outcome);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_submit_from_saturated_worker_does_not_block() {
        let publisher = Arc::new(Resubmitting {
            pool: Mutex::new(None),
            nested: Mutex::new(Vec::new()),
            saw_worker_flag: Mutex::new(Vec::new()),
        });
        let pool = Arc::new(
            DispatchPool::try_new(
                PoolConfig::default().with_max_workers(1),
                publisher.clone(),
                Metrics::new(),
            )
            .unwrap(),
        );
        *publisher.pool.lock() = Some(Arc::clone(&pool));

        assert!(!is_dispatch_worker());
        assert_eq!(pool.submit(job("outer")).wait(), JobOutcome::Published);
        assert_eq!(*publisher.nested.lock(), vec![JobOutcome::Abandoned]);
        assert_eq!(*publisher.saw_worker_flag.lock(), vec![true]);

        // Break the pool <-> publisher cycle.
        publisher.pool.lock().take();
        pool.shutdown(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_invalid_config_falls_back_to_unbounded() {
        let publisher = Arc::new(RecordingPublisher::new());
        let config = PoolConfig::default().with_max_workers(0);

        assert!(DispatchPool::try_new(config, publisher.clone(), Metrics::new()).is_err());

        let pool = DispatchPool::new(config, publisher.clone(), Metrics::new());
        assert_eq!(pool.config(), PoolConfig::unbounded());
        assert_eq!(pool.submit(job("hello")).wait(), JobOutcome::Published);
    }

    #[test]
    fn test_submit_publishes() {
        let publisher = Arc::new(RecordingPublisher::new());
        let pool = DispatchPool::new(PoolConfig::default(), publisher.clone(), Metrics::new());

        let outcome = pool.submit(job("hello")).wait();

        assert_eq!(outcome, JobOutcome::Published);
        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].message, "hello");
        assert_eq!(published[0].subject.as_deref(), Some("subject"));
        assert_eq!(published[0].topic, topic());
        assert!(published[0]
            .thread_name
            .as_deref()
            .is_some_and(|name| name.starts_with(WORKER_NAME_PREFIX)));
    }

    #[test]
    fn test_min_workers_prestarted() {
        let publisher = Arc::new(RecordingPublisher::new());
        let config = PoolConfig::default().with_min_workers(2).with_max_workers(4);
        let pool = DispatchPool::try_new(config, publisher, Metrics::new()).unwrap();

        assert_eq!(pool.live_workers(), 2);
    }

    #[test]
    fn test_publish_error_is_reported() {
        let metrics = Metrics::new();
        let pool = DispatchPool::new(
            PoolConfig::default(),
            Arc::new(FailingPublisher::new("throttled by transport")),
            metrics.clone(),
        );

        let outcome = pool.submit(job("x")).wait();

        assert_eq!(
            outcome,
            JobOutcome::Failed(PublishError::new("throttled by transport"))
        );
        assert_eq!(metrics.publish_failures(), 1);
    }

    #[test]
    fn test_publisher_panic_is_a_failure() {
        let metrics = Metrics::new();
        let pool = DispatchPool::new(
            PoolConfig::default().with_max_workers(1),
            Arc::new(FailingPublisher::panicking()),
            metrics.clone(),
        );

        assert!(matches!(pool.submit(job("x")).wait(), JobOutcome::Failed(_)));
        // The worker survived the panic and keeps serving.
        assert!(matches!(pool.submit(job("y")).wait(), JobOutcome::Failed(_)));
        assert_eq!(metrics.publish_failures(), 2);
    }

    #[test]
    fn test_saturated_pool_blocks_without_loss() {
        let publisher = Arc::new(RecordingPublisher::with_delay(Duration::from_millis(30)));
        let config = PoolConfig::default().with_max_workers(2);
        let pool = DispatchPool::new(config, publisher.clone(), Metrics::new());

        let handles: Vec<_> = (0..8).map(|i| pool.submit(job(&format!("m{}", i)))).collect();
        for handle in handles {
            assert_eq!(handle.wait(), JobOutcome::Published);
        }

        assert_eq!(publisher.published().len(), 8);
        assert!(publisher.peak_concurrency() <= 2);
        assert!(pool.live_workers() <= 2);
    }

    #[test]
    fn test_idle_workers_retire_after_keep_alive() {
        let publisher = Arc::new(RecordingPublisher::new());
        let config = PoolConfig::default()
            .with_max_workers(3)
            .with_keep_alive(Duration::from_millis(50));
        let pool = DispatchPool::new(config, publisher, Metrics::new());

        pool.submit(job("x")).wait();
        assert!(pool.live_workers() >= 1);

        let deadline = Instant::now() + Duration::from_secs(2);
        while pool.live_workers() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_submit_after_shutdown_is_abandoned() {
        let metrics = Metrics::new();
        let pool = DispatchPool::new(
            PoolConfig::default(),
            Arc::new(RecordingPublisher::new()),
            metrics.clone(),
        );

        assert_eq!(pool.shutdown(Duration::from_millis(100)), Ok(()));
        assert_eq!(pool.state(), PoolState::Stopped);

        let mut handle = pool.submit(job("late"));
        assert_eq!(handle.try_outcome(), Some(JobOutcome::Abandoned));
        assert_eq!(metrics.jobs_abandoned(), 1);
    }

    #[test]
    fn test_shutdown_waits_for_in_flight_job() {
        let publisher = Arc::new(RecordingPublisher::with_delay(Duration::from_millis(100)));
        let pool = DispatchPool::new(PoolConfig::default(), publisher.clone(), Metrics::new());

        let handle = pool.submit(job("slow"));
        assert_eq!(pool.shutdown(Duration::from_secs(2)), Ok(()));
        assert_eq!(handle.wait(), JobOutcome::Published);
        assert_eq!(publisher.published().len(), 1);
    }

    #[test]
    fn test_shutdown_timeout_reports_in_flight() {
        let publisher = Arc::new(RecordingPublisher::with_delay(Duration::from_millis(500)));
        let pool = DispatchPool::new(PoolConfig::default(), publisher, Metrics::new());

        let mut handle = pool.submit(job("slow"));
        // Let the worker pick the job up.
        while pool.busy_workers() == 0 {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(
            pool.shutdown(Duration::from_millis(20)),
            Err(ShutdownTimeout { in_flight: 1 })
        );
        assert_eq!(pool.state(), PoolState::Stopped);
        assert_eq!(handle.wait_timeout(Duration::ZERO), None);
        assert_eq!(handle.wait(), JobOutcome::Published);
    }

    #[test]
    fn test_blocked_submitter_released_by_shutdown() {
        let publisher = Arc::new(RecordingPublisher::with_delay(Duration::from_millis(300)));
        let pool = Arc::new(DispatchPool::new(
            PoolConfig::default().with_max_workers(1),
            publisher,
            Metrics::new(),
        ));

        let first = pool.submit(job("first"));
        while pool.busy_workers() == 0 {
            thread::sleep(Duration::from_millis(5));
        }

        let submitter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.submit(job("second")).wait())
        };
        thread::sleep(Duration::from_millis(60));
        let _ = pool.shutdown(Duration::from_secs(2));

        assert_eq!(submitter.join().unwrap(), JobOutcome::Abandoned);
        assert_eq!(first.wait(), JobOutcome::Published);
    }

    #[test]
    fn test_handle_caches_outcome() {
        let pool = DispatchPool::new(
            PoolConfig::default(),
            Arc::new(RecordingPublisher::new()),
            Metrics::new(),
        );
        let mut handle = pool.submit(job("x"));

        assert_eq!(
            handle.wait_timeout(Duration::from_secs(2)),
            Some(JobOutcome::Published)
        );
        assert_eq!(handle.try_outcome(), Some(JobOutcome::Published));
        assert_eq!(handle.wait(), JobOutcome::Published);
    }
}
