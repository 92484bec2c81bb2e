//! Application layer - orchestration of domain logic.
//!
//! This layer turns records into decisions and decisions into publish jobs:
//! - Dedup cache (time-bounded signature memory)
//! - Throttling evaluator (mask + cache, swappable configuration)
//! - Dispatch pool (bounded worker threads running publish jobs)
//! - Cache sweeper (background expiry)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters and host applications implement: the clock, the cache storage,
//! the publisher, and the renderer.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod evaluator;
pub mod metrics;
pub mod ports;
pub mod sweeper;
