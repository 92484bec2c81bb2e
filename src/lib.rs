//! # tracing-notifier
//!
//! Forward selected log events to a pub/sub topic without flooding it.
//!
//! This crate provides a `tracing::Layer` that turns log events into
//! notifications. Duplicate events are throttled: each distinct **signature**
//! is published once, then suppressed until its retention period runs out.
//! Publishing happens on a bounded pool of worker threads, so the logging
//! thread never waits on the network.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tracing_notifier::{NotificationLayer, PublishError, Publisher, TopicHandle};
//! use tracing::Level;
//! use tracing_subscriber::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Stdout;
//!
//! impl Publisher for Stdout {
//!     fn publish(
//!         &self,
//!         topic: &TopicHandle,
//!         message: &str,
//!         subject: Option<&str>,
//!     ) -> Result<(), PublishError> {
//!         println!("[{}] {:?}: {}", topic.name(), subject, message);
//!         Ok(())
//!     }
//! }
//!
//! let notifier = NotificationLayer::builder()
//!     .with_publisher(Arc::new(Stdout))
//!     .with_topic(TopicHandle::new("arn:aws:sns:eu-west-1:123456789012:alerts"))
//!     .with_subject("Production alert")
//!     .with_threshold(Level::ERROR)
//!     .with_evaluator_properties("period=10\nunit=MINUTES\nmask=LOGGER_NAME,LINE_NUMBER")
//!     .build()
//!     .unwrap();
//!
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(notifier.clone())
//!     .init();
//!
//! tracing::error!("disk full");
//!
//! // On shutdown, give the last notification a chance to go out.
//! let _ = notifier.close();
//! ```
//!
//! ## Signatures
//!
//! A signature is built from the fields selected by a `FieldMask`, in a fixed
//! order, each followed by `/`. The default mask is `LOGGER_NAME,LINE_NUMBER`,
//! so every call site throttles independently regardless of message text:
//!
//! ```rust
//! use tracing_notifier::{FieldMask, LogRecord, Signature};
//!
//! let record = LogRecord::new("ERROR", "app::db", "timeout after 30s").with_line(42);
//! assert_eq!(Signature::build(&record, FieldMask::default()).as_str(), "app::db/42/");
//! ```
//!
//! Available fields: `LEVEL`, `LOGGER_NAME`, `THREAD_NAME`, `FILE_NAME`,
//! `CLASS_NAME`, `METHOD_NAME`, `LINE_NUMBER`, `STACK_TRACE`.
//!
//! ## Configuration
//!
//! The evaluator reads `period`, `unit`, and `mask` from a flat map or from
//! properties-style text. Invalid values are logged at `warn` and fall back to
//! their defaults (`10`, `MINUTES`, `LOGGER_NAME,LINE_NUMBER`) one option at a
//! time. Appender options (`topic_name`, `topic_subject`,
//! `evaluator_properties`, `pool_min`, `pool_max`, `threshold`) are read with
//! `AppenderOptions::from_map` and applied with `with_options`.
//!
//! ## Dispatch
//!
//! The dispatch pool starts `pool_min` workers (default 0) and grows to
//! `pool_max` (default 10). When every worker is busy the submitting thread
//! waits for one to free up; jobs are never dropped by the pool. Messages are
//! cut to 64 KiB and subjects to 100 bytes on UTF-8 boundaries.
//!
//! ## Observability
//!
//! ```rust,no_run
//! # use tracing_notifier::NotificationLayer;
//! # fn report(layer: &NotificationLayer) {
//! let snapshot = layer.metrics().snapshot();
//! println!("triggered: {}", snapshot.events_triggered);
//! println!("throttled: {:.1}%", snapshot.throttle_rate() * 100.0);
//! println!("publish failures: {}", snapshot.publish_failures);
//! # }
//! ```
//!
//! Internal diagnostics are emitted through `tracing` under this crate's
//! targets and are never forwarded by the layer itself.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    policy::{RetentionError, RetentionPolicy, TimeUnit},
    record::LogRecord,
    signature::{FieldMask, Signature, SignatureField, UnknownFieldError},
    topic::TopicHandle,
    truncate::{truncate_to_byte_limit, MESSAGE_LIMIT, SUBJECT_LIMIT},
};

pub use application::{
    cache::{CacheEntry, DedupCache},
    config::{parse_properties, AppenderOptions, ConfigError, ThrottleSettings},
    dispatch::{
        is_dispatch_worker, DispatchJob, DispatchPool, JobHandle, JobOutcome, PoolConfig,
        PoolInitError, PoolState, ShutdownTimeout,
    },
    evaluator::{Evaluator, ThrottleDecision, ThrottlingEvaluator},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, PublishError, Publisher, Renderer, Storage},
    sweeper::{CacheSweeper, SweeperConfig, SweeperConfigError},
};

#[cfg(feature = "async")]
pub use application::sweeper::{ShutdownError, SweeperHandle};

pub use infrastructure::{
    clock::SystemClock,
    layer::{AppendOutcome, BuildError, NotificationLayer, NotificationLayerBuilder},
    layout::{JsonLayout, LayoutKeys},
    storage::ShardedStorage,
};
