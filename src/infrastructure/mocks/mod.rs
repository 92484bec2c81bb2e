//! Test doubles for infrastructure adapters.
//!
//! Enables deterministic tests of expiry and dispatch without a real clock
//! or a real messaging client.

pub mod clock;
pub mod publisher;

pub use clock::MockClock;
pub use publisher::{FailingPublisher, PublishedMessage, RecordingPublisher};
