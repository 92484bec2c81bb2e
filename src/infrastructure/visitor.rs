//! Field visitor turning tracing event fields into record attributes.
//!
//! Splits an event's fields three ways:
//! - `message` becomes the record message
//! - errors become the stack trace (the error followed by its source chain)
//! - everything else lands in the record's structured fields

use std::collections::BTreeMap;
use std::fmt;
use tracing::field::{Field, Visit};

const MESSAGE_FIELD: &str = "message";
const ERROR_FIELD: &str = "error";
const STACK_FIELDS: [&str; 2] = ["stack", "backtrace"];

/// Prefix of each source line in an error chain.
pub(crate) const CAUSE_PREFIX: &str = "caused by: ";

/// Collected event fields.
#[derive(Debug, Default)]
pub(crate) struct EventFields {
    pub message: Option<String>,
    pub stack_trace: Option<Vec<String>>,
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub(crate) struct EventVisitor {
    collected: EventFields,
}

impl EventVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_fields(self) -> EventFields {
        self.collected
    }

    fn record_text(&mut self, field: &Field, value: String) {
        let name = field.name();
        if name == MESSAGE_FIELD {
            self.collected.message = Some(value);
        } else if STACK_FIELDS.contains(&name) {
            self.collected.stack_trace = Some(value.lines().map(str::to_string).collect());
        } else {
            if name == ERROR_FIELD && self.collected.stack_trace.is_none() {
                self.collected.stack_trace = Some(vec![value.clone()]);
            }
            self.collected.fields.insert(name.to_string(), value);
        }
    }
}

impl Visit for EventVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.record_text(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.record_text(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.record_text(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.record_text(field, value.to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_text(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut lines = vec![value.to_string()];
        let mut source = value.source();
        while let Some(cause) = source {
            lines.push(format!("{}{}", CAUSE_PREFIX, cause));
            source = cause.source();
        }
        self.collected
            .fields
            .insert(field.name().to_string(), value.to_string());
        self.collected.stack_trace = Some(lines);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_text(field, format!("{:?}", value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::subscriber::with_default;
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::{registry::Registry, Layer};

    #[derive(Debug)]
    struct Outer(Inner);
    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("request failed")
        }
    }
    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("connection reset")
        }
    }
    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }
    impl std::error::Error for Inner {}

    struct Capture(Arc<Mutex<Vec<EventFields>>>);

    impl<S: tracing::Subscriber> Layer<S> for Capture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            let mut visitor = EventVisitor::new();
            event.record(&mut visitor);
            self.0.lock().unwrap().push(visitor.into_fields());
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<EventFields> {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let subscriber = Registry::default().with(Capture(Arc::clone(&captured)));
        with_default(subscriber, f);
        let mut guard = captured.lock().unwrap();
        std::mem::take(&mut *guard)
    }

    #[test]
    fn test_message_and_fields() {
        let events = capture(|| {
            tracing::warn!(user = "alice", attempts = 3, "login {} failed", "badly");
        });

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message.as_deref(), Some("login badly failed"));
        assert_eq!(events[0].fields.get("user").map(String::as_str), Some("alice"));
        assert_eq!(events[0].fields.get("attempts").map(String::as_str), Some("3"));
        assert!(events[0].stack_trace.is_none());
    }

    #[test]
    fn test_error_chain_becomes_stack_trace() {
        let err = Outer(Inner);
        let events = capture(|| {
            tracing::error!(error = &err as &(dyn std::error::Error + 'static), "call failed");
        });

        assert_eq!(
            events[0].stack_trace,
            Some(vec![
                "request failed".to_string(),
                "caused by: connection reset".to_string()
            ])
        );
    }

    #[test]
    fn test_display_error_field_is_single_line_trace() {
        let events = capture(|| {
            tracing::error!(error = %Outer(Inner), "call failed");
        });

        assert_eq!(events[0].stack_trace, Some(vec!["request failed".to_string()]));
        assert_eq!(events[0].fields.get("error").map(String::as_str), Some("request failed"));
    }

    #[test]
    fn test_stack_field_split_into_lines() {
        let events = capture(|| {
            tracing::error!(stack = "at a()\nat b()", "panic caught");
        });

        assert_eq!(
            events[0].stack_trace,
            Some(vec!["at a()".to_string(), "at b()".to_string()])
        );
        assert!(!events[0].fields.contains_key("stack"));
    }
}
