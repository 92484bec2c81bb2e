//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports, and the
//! collaborators the appender talks to (the messaging client and the record
//! renderer) are expressed here as traits.

use crate::domain::{record::LogRecord, topic::TopicHandle};
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::time::Instant;

/// Port for obtaining current time.
///
/// This abstraction allows the application layer to work with time
/// without depending on system clock implementation details.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current instant.
    fn now(&self) -> Instant;
}

/// Port for concurrent key-value storage.
///
/// The dedup cache relies on `with_entry_mut` being atomic per key: the
/// factory and the accessor run while the entry is exclusively locked.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Error reported by the publish collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishError {
    message: String,
}

impl PublishError {
    /// Create a publish error with a description.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The error description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "publish failed: {}", self.message)
    }
}

impl std::error::Error for PublishError {}

/// Port for the messaging client.
///
/// `publish` is called on a dispatch worker thread, never on the logging
/// thread, so implementations may block on network I/O. Message and subject
/// have already been cut to the transport limits.
pub trait Publisher: Send + Sync + Debug {
    /// Publish one message to `topic`.
    fn publish(
        &self,
        topic: &TopicHandle,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), PublishError>;

    /// List the topics visible to this client.
    ///
    /// Used to resolve a short topic name into a handle. The default lists
    /// nothing, which makes name resolution fail.
    fn list_topics(&self) -> Result<Vec<TopicHandle>, PublishError> {
        Ok(Vec::new())
    }
}

/// Port for rendering a record into the published message body.
///
/// Implementations must not fail: on an internal error they return a fallback
/// payload describing the problem.
pub trait Renderer: Send + Sync + Debug {
    /// Render `record` as text.
    fn render(&self, record: &LogRecord) -> String;
}
