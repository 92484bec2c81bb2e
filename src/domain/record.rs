//! Log records handed to the appender.
//!
//! A `LogRecord` is the framework-neutral view of a log event: the tracing
//! layer builds one per event, and evaluators, signatures, and layouts only
//! ever look at this type.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A single log event.
///
/// Level, logger name, and message are always present. Location data, the
/// thread name, and the stack trace depend on what the logging framework
/// captured and may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Level name (e.g. "WARN", "ERROR")
    pub level: String,
    /// Logger name; the event target for tracing events
    pub logger_name: String,
    /// Rendered message text
    pub message: String,
    /// Name of the thread that produced the event
    pub thread_name: Option<String>,
    /// Source file
    pub file: Option<String>,
    /// Enclosing type or module path
    pub class_name: Option<String>,
    /// Enclosing function or span name
    pub method_name: Option<String>,
    /// Source line
    pub line: Option<u32>,
    /// Stack trace lines, outermost first
    pub stack_trace: Option<Vec<String>>,
    /// Additional structured fields
    pub fields: BTreeMap<String, String>,
    /// When the event was produced
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Create a record with the mandatory attributes, timestamped now.
    pub fn new(
        level: impl Into<String>,
        logger_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level: level.into(),
            logger_name: logger_name.into(),
            message: message.into(),
            thread_name: None,
            file: None,
            class_name: None,
            method_name: None,
            line: None,
            stack_trace: None,
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Set the thread name.
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = Some(thread_name.into());
        self
    }

    /// Set the source file.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Set the class (type or module path).
    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Set the method (function or span name).
    pub fn with_method_name(mut self, method_name: impl Into<String>) -> Self {
        self.method_name = Some(method_name.into());
        self
    }

    /// Set the source line.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Set the stack trace lines.
    pub fn with_stack_trace<I, L>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.stack_trace = Some(lines.into_iter().map(Into::into).collect());
        self
    }

    /// Add a structured field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Override the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
