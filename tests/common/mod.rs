//! Publishers shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_notifier::{PublishError, Publisher, TopicHandle};

pub const ARN: &str = "arn:aws:sns:us-east-1:123456789012:ops-alerts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub topic: String,
    pub message: String,
    pub subject: Option<String>,
}

/// Records everything it is asked to publish.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    sent: Arc<Mutex<Vec<Sent>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    delay: Duration,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Poll until `count` messages were sent or two seconds pass.
    pub fn wait_for(&self, count: usize) -> Vec<Sent> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.sent.lock().unwrap().len() < count && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        self.sent()
    }
}

impl Publisher for Recorder {
    fn publish(
        &self,
        topic: &TopicHandle,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), PublishError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.sent.lock().unwrap().push(Sent {
            topic: topic.arn().to_string(),
            message: message.to_string(),
            subject: subject.map(str::to_string),
        });
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn list_topics(&self) -> Result<Vec<TopicHandle>, PublishError> {
        Ok(vec![TopicHandle::new(ARN)])
    }
}

/// Fails every publish and counts the attempts.
#[derive(Debug, Clone, Default)]
pub struct AlwaysFails {
    attempts: Arc<AtomicUsize>,
}

impl AlwaysFails {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Publisher for AlwaysFails {
    fn publish(
        &self,
        _topic: &TopicHandle,
        _message: &str,
        _subject: Option<&str>,
    ) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(PublishError::new("endpoint unreachable"))
    }
}
