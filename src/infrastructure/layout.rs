//! JSON rendering of log records.
//!
//! `JsonLayout` is the default `Renderer`. Each record becomes one JSON
//! object; key names are configurable and any key can be switched off.

use crate::application::ports::Renderer;
use crate::domain::record::LogRecord;
use crate::domain::truncate::{truncate_to_byte_limit, MESSAGE_LIMIT};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key name that disables a key, in addition to the empty string.
pub const IGNORE_KEY: &str = "ignore";

/// Default number of stack trace lines rendered.
pub const DEFAULT_STACK_DEPTH: usize = 3;

/// Key names used in the rendered object.
///
/// Setting a key to `""` or `"ignore"` leaves that attribute out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutKeys {
    /// Logger name
    pub logger: String,
    /// Level name
    pub level: String,
    /// RFC 3339 timestamp
    pub time: String,
    /// Thread name
    pub thread: String,
    /// Message text
    pub message: String,
    /// Source file
    pub file: String,
    /// Class or module path
    pub class: String,
    /// Method or span name
    pub method: String,
    /// Source line
    pub line: String,
    /// Stack trace array
    pub stack: String,
    /// Selected structured fields
    pub fields: String,
    /// Key of the fallback payload
    pub error: String,
}

impl Default for LayoutKeys {
    fn default() -> Self {
        Self {
            logger: "logger".to_string(),
            level: "level".to_string(),
            time: "time".to_string(),
            thread: "thread".to_string(),
            message: "message".to_string(),
            file: "file".to_string(),
            class: "class".to_string(),
            method: "method".to_string(),
            line: "line".to_string(),
            stack: "stack".to_string(),
            fields: "fields".to_string(),
            error: "error".to_string(),
        }
    }
}

fn enabled(key: &str) -> Option<&str> {
    if key.is_empty() || key.eq_ignore_ascii_case(IGNORE_KEY) {
        None
    } else {
        Some(key)
    }
}

/// Renders records as JSON objects.
///
/// ```
/// use tracing_notifier::application::ports::Renderer;
/// use tracing_notifier::domain::record::LogRecord;
/// use tracing_notifier::infrastructure::layout::JsonLayout;
///
/// let layout = JsonLayout::new();
/// let json = layout.render(&LogRecord::new("ERROR", "app::db", "down").with_line(7));
///
/// let value: serde_json::Value = serde_json::from_str(&json).unwrap();
/// assert_eq!(value["logger"], "app::db");
/// assert_eq!(value["line"], 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonLayout {
    keys: LayoutKeys,
    stack_depth: usize,
    field_names: Vec<String>,
    pretty: bool,
}

impl JsonLayout {
    /// Create a layout with default keys, three stack lines, no extra fields.
    pub fn new() -> Self {
        Self {
            keys: LayoutKeys::default(),
            stack_depth: DEFAULT_STACK_DEPTH,
            field_names: Vec::new(),
            pretty: false,
        }
    }

    /// Replace the key names.
    pub fn with_keys(mut self, keys: LayoutKeys) -> Self {
        self.keys = keys;
        self
    }

    /// Render at most `depth` stack trace lines.
    pub fn with_stack_depth(mut self, depth: usize) -> Self {
        self.stack_depth = depth;
        self
    }

    /// Include these structured fields, when present on the record.
    pub fn with_fields<I, T>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.field_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Pretty-print the output.
    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// The key names in use.
    pub fn keys(&self) -> &LayoutKeys {
        &self.keys
    }

    fn to_value(&self, record: &LogRecord) -> Map<String, Value> {
        let keys = &self.keys;
        let mut object = Map::new();
        let mut put = |key: &str, value: Option<Value>| {
            if let (Some(key), Some(value)) = (enabled(key), value) {
                object.insert(key.to_string(), value);
            }
        };

        put(&keys.logger, Some(Value::from(record.logger_name.as_str())));
        put(&keys.level, Some(Value::from(record.level.as_str())));
        put(
            &keys.time,
            Some(Value::from(
                record.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            )),
        );
        put(&keys.thread, record.thread_name.as_deref().map(Value::from));
        put(&keys.message, Some(Value::from(record.message.as_str())));
        put(&keys.file, record.file.as_deref().map(Value::from));
        put(&keys.class, record.class_name.as_deref().map(Value::from));
        put(&keys.method, record.method_name.as_deref().map(Value::from));
        put(&keys.line, record.line.map(Value::from));
        put(
            &keys.stack,
            record.stack_trace.as_ref().map(|lines| {
                Value::Array(
                    lines
                        .iter()
                        .take(self.stack_depth)
                        .map(|line| Value::from(line.as_str()))
                        .collect(),
                )
            }),
        );

        let selected: Map<String, Value> = self
            .field_names
            .iter()
            .filter_map(|name| {
                record
                    .fields
                    .get(name)
                    .map(|value| (name.clone(), Value::from(value.as_str())))
            })
            .collect();
        put(
            &keys.fields,
            (!selected.is_empty()).then_some(Value::Object(selected)),
        );

        object
    }

    fn try_render(&self, record: &LogRecord) -> Result<String, serde_json::Error> {
        let value = Value::Object(self.to_value(record));
        if self.pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
    }

    /// Payload used when rendering fails.
    ///
    /// The description is cut to half the message limit.
    pub fn fallback(&self, description: &str) -> String {
        let key = enabled(&self.keys.error).unwrap_or("error");
        let description = truncate_to_byte_limit(description, MESSAGE_LIMIT / 2);
        let mut object = Map::new();
        object.insert(key.to_string(), Value::from(description));
        Value::Object(object).to_string()
    }
}

impl Default for JsonLayout {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for JsonLayout {
    fn render(&self, record: &LogRecord) -> String {
        match self.try_render(record) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(%err, "could not render record as JSON");
                self.fallback(&err.to_string())
            }
        }
    }
}
