//! Domain layer - pure business logic with no external dependencies.
//!
//! This layer contains the core concepts and invariants of the notifier:
//! - Log records as seen by the appender
//! - Signature computation under a field mask
//! - Retention periods and time units
//! - Byte-accurate payload truncation
//! - Topic handles
//!
//! All types in this layer are pure and easily testable.

pub mod policy;
pub mod record;
pub mod signature;
pub mod topic;
pub mod truncate;
