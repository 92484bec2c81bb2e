//! Basic example forwarding errors to a topic with throttling.
//!
//! The publisher prints to stdout instead of calling a real messaging service.
//! Each call site notifies at most once per two-second window.
//!
//! Run with: `cargo run --example basic`

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_notifier::{NotificationLayer, PublishError, Publisher, TopicHandle};
use tracing_subscriber::prelude::*;

#[derive(Debug)]
struct StdoutPublisher;

impl Publisher for StdoutPublisher {
    fn publish(
        &self,
        topic: &TopicHandle,
        message: &str,
        subject: Option<&str>,
    ) -> Result<(), PublishError> {
        println!(
            "  -> [{}] {}: {}",
            topic.name(),
            subject.unwrap_or("(no subject)"),
            message
        );
        Ok(())
    }

    fn list_topics(&self) -> Result<Vec<TopicHandle>, PublishError> {
        Ok(vec![TopicHandle::new("arn:aws:sns:eu-west-1:123456789012:ops-alerts")])
    }
}

fn main() {
    let notifier = NotificationLayer::builder()
        .with_publisher(Arc::new(StdoutPublisher))
        .with_topic_name("ops-alerts")
        .with_subject("Demo alert")
        .with_threshold(Level::WARN)
        .with_evaluator_properties("period=2\nunit=SECONDS\nmask=LOGGER_NAME,LINE_NUMBER")
        .build()
        .expect("topic resolves");

    tracing_subscriber::registry().with(notifier.clone()).init();

    println!("=== Notification Example ===\n");
    println!("Threshold: WARN, window: 2 seconds per call site\n");

    let db_error = |attempt: u32| error!(attempt, "database connection refused");

    println!("Emitting 5 identical errors (only the first is published):");
    for attempt in 1..=5 {
        db_error(attempt);
    }
    thread::sleep(Duration::from_millis(100));

    println!("\nEmitting INFO events (below threshold, never published):");
    for request in 1..=3 {
        info!(request, "request served");
    }

    println!("\nA different call site has its own window:");
    warn!("cache hit ratio below 50%");
    thread::sleep(Duration::from_millis(100));

    println!("\nWaiting for the window to expire...");
    thread::sleep(Duration::from_millis(2100));
    for attempt in 6..=7 {
        db_error(attempt);
    }

    if let Err(err) = notifier.close() {
        eprintln!("close: {}", err);
    }
    let snapshot = notifier.metrics().snapshot();

    println!("\n=== Example Complete ===");
    println!(
        "Triggered: {}, throttled: {}, published: {}",
        snapshot.events_triggered, snapshot.events_throttled, snapshot.jobs_published
    );
}
