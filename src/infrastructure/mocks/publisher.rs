//! Publisher test doubles.

use crate::application::ports::{PublishError, Publisher};
use crate::domain::topic::TopicHandle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A message captured by `RecordingPublisher`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Target topic
    pub topic: TopicHandle,
    /// Message body
    pub message: String,
    /// Subject, if any
    pub subject: Option<String>,
    /// Thread the publish ran on
    pub thread_name: Option<String>,
}

#[derive(Debug, Default)]
struct Recorded {
    messages: Mutex<Vec<PublishedMessage>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Publisher that records every message instead of sending it.
///
/// Clones share the same recording. An optional delay simulates a slow
/// transport so tests can saturate the dispatch pool.
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    recorded: Arc<Recorded>,
    delay: Option<Duration>,
    topics: Vec<TopicHandle>,
}

impl RecordingPublisher {
    /// Create a publisher that returns immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a publisher that sleeps for `delay` on every publish.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Topics reported by `list_topics`.
    pub fn with_topics<I, T>(mut self, arns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.topics = arns.into_iter().map(TopicHandle::new).collect();
        self
    }

    /// Everything published so far, in completion order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.recorded.messages.lock().clone()
    }

    /// Highest number of publishes observed running at once.
    pub fn peak_concurrency(&self) -> usize {
        self.recorded.peak.load(Ordering::SeqCst)
    }
}

impl Publisher for RecordingPublisher {
    fn publish(
        &self,
        topic: &TopicHandle,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), PublishError> {
        let running = self.recorded.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorded.peak.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.recorded.messages.lock().push(PublishedMessage {
            topic: topic.clone(),
            message: message.to_string(),
            subject: subject.map(str::to_string),
            thread_name: std::thread::current().name().map(str::to_string),
        });

        self.recorded.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn list_topics(&self) -> Result<Vec<TopicHandle>, PublishError> {
        Ok(self.topics.clone())
    }
}

/// Publisher whose every publish fails.
#[derive(Debug, Clone)]
pub struct FailingPublisher {
    message: Option<String>,
}

impl FailingPublisher {
    /// Fail with a `PublishError` carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Panic inside `publish`.
    pub fn panicking() -> Self {
        Self { message: None }
    }
}

impl Publisher for FailingPublisher {
    fn publish(
        &self,
        _topic: &TopicHandle,
        _message: &str,
        _subject: Option<&str>,
    ) -> Result<(), PublishError> {
        match &self.message {
            Some(message) => Err(PublishError::new(message.clone())),
            None => panic!("transport exploded"),
        }
    }

    fn list_topics(&self) -> Result<Vec<TopicHandle>, PublishError> {
        Err(PublishError::new(
            self.message.clone().unwrap_or_else(|| "unreachable".to_string()),
        ))
    }
}
