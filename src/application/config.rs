//! Configuration for the evaluator and the appender.
//!
//! Configuration arrives as a flat string map, either built by the host or
//! parsed from properties-style text. Every option is validated on its own:
//! a bad value is reported as a `ConfigError`, logged at `warn`, and replaced
//! by that option's default while the remaining options still apply.

use crate::domain::policy::{RetentionError, RetentionPolicy, TimeUnit};
use crate::domain::signature::{FieldMask, SignatureField};
use std::collections::BTreeMap;
use std::fmt;
use tracing::Level;

/// Option key for the retention amount.
pub const PERIOD_KEY: &str = "period";
/// Option key for the retention unit.
pub const UNIT_KEY: &str = "unit";
/// Option key for the signature field mask.
pub const MASK_KEY: &str = "mask";

/// Default retention amount.
pub const DEFAULT_PERIOD: u64 = 10;
/// Default retention unit.
pub const DEFAULT_UNIT: TimeUnit = TimeUnit::Minutes;

/// A configuration value that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `period` is not an integer
    InvalidPeriod(String),
    /// `period` is zero or negative
    NonPositivePeriod(String),
    /// `period` times `unit` does not fit in a duration
    PeriodOverflow {
        /// Requested amount
        amount: u64,
        /// Requested unit
        unit: TimeUnit,
    },
    /// `unit` is not a known time unit
    InvalidUnit(String),
    /// A `mask` entry is not a known field
    InvalidMaskName(String),
    /// `mask` named no valid field
    EmptyMask(String),
    /// A pool size option is not a non-negative integer
    InvalidPoolSize {
        /// Option key
        key: String,
        /// Rejected value
        value: String,
    },
    /// `threshold` is not a level name
    InvalidThreshold(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPeriod(value) => {
                write!(f, "period {:?} is not an integer", value)
            }
            ConfigError::NonPositivePeriod(value) => {
                write!(f, "period {:?} must be greater than 0", value)
            }
            ConfigError::PeriodOverflow { amount, unit } => {
                write!(f, "period {} {} is too large", amount, unit)
            }
            ConfigError::InvalidUnit(value) => write!(f, "unknown time unit {:?}", value),
            ConfigError::InvalidMaskName(value) => {
                write!(f, "unknown signature field {:?}", value)
            }
            ConfigError::EmptyMask(value) => {
                write!(f, "mask {:?} names no signature field", value)
            }
            ConfigError::InvalidPoolSize { key, value } => {
                write!(f, "{} {:?} is not a non-negative integer", key, value)
            }
            ConfigError::InvalidThreshold(value) => write!(f, "unknown level {:?}", value),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse properties-style text into a flat map.
///
/// Accepts `key=value` and `key: value` lines. Blank lines and lines starting
/// with `#` or `!` are skipped, keys and values are trimmed, and a line with
/// no separator maps the whole line to an empty value. Later keys win.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (key, value) = match line.find(|c: char| c == '=' || c == ':') {
            Some(idx) => (&line[..idx], &line[idx + 1..]),
            None => (line, ""),
        };
        map.insert(key.trim().to_string(), value.trim().to_string());
    }
    map
}

/// Immutable throttling settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThrottleSettings {
    /// How long a signature stays seen
    pub retention: RetentionPolicy,
    /// Which record attributes form the signature
    pub mask: FieldMask,
}

impl ThrottleSettings {
    /// Create settings from a retention policy and a mask.
    pub fn new(retention: RetentionPolicy, mask: FieldMask) -> Self {
        Self { retention, mask }
    }

    /// Read `period`, `unit`, and `mask` from `options`.
    ///
    /// Missing keys take their defaults silently. Each invalid value is
    /// logged, returned in the error list, and replaced by its default.
    pub fn from_options(options: &BTreeMap<String, String>) -> (Self, Vec<ConfigError>) {
        let mut errors = Vec::new();

        let amount = match options.get(PERIOD_KEY) {
            Some(raw) => parse_period(raw).unwrap_or_else(|err| {
                errors.push(err);
                DEFAULT_PERIOD
            }),
            None => DEFAULT_PERIOD,
        };

        let unit = match options.get(UNIT_KEY) {
            Some(raw) => raw.parse::<TimeUnit>().unwrap_or_else(|_| {
                errors.push(ConfigError::InvalidUnit(raw.trim().to_string()));
                DEFAULT_UNIT
            }),
            None => DEFAULT_UNIT,
        };

        let retention = match RetentionPolicy::from_parts(amount, unit) {
            Ok(policy) => policy,
            Err(RetentionError::Overflow { amount, unit }) => {
                errors.push(ConfigError::PeriodOverflow { amount, unit });
                fallback_retention(unit)
            }
            // parse_period already rejected zero
            Err(RetentionError::ZeroPeriod) => fallback_retention(unit),
        };

        let mask = match options.get(MASK_KEY) {
            Some(raw) => parse_mask(raw, &mut errors),
            None => FieldMask::default(),
        };

        for error in &errors {
            tracing::warn!(%error, "invalid throttling option, using default");
        }

        (Self { retention, mask }, errors)
    }
}

fn parse_period(raw: &str) -> Result<u64, ConfigError> {
    let trimmed = raw.trim();
    let value: i128 = trimmed
        .parse()
        .map_err(|_| ConfigError::InvalidPeriod(trimmed.to_string()))?;
    if value <= 0 {
        return Err(ConfigError::NonPositivePeriod(trimmed.to_string()));
    }
    u64::try_from(value).map_err(|_| ConfigError::InvalidPeriod(trimmed.to_string()))
}

fn fallback_retention(unit: TimeUnit) -> RetentionPolicy {
    RetentionPolicy::from_parts(DEFAULT_PERIOD, unit).unwrap_or_default()
}

fn parse_mask(raw: &str, errors: &mut Vec<ConfigError>) -> FieldMask {
    let mut mask = FieldMask::empty();
    for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
        match name.parse::<SignatureField>() {
            Ok(field) => mask = mask.with(field),
            Err(err) => errors.push(ConfigError::InvalidMaskName(err.name().to_string())),
        }
    }
    if mask.is_empty() {
        errors.push(ConfigError::EmptyMask(raw.trim().to_string()));
        return FieldMask::default();
    }
    mask
}

/// Option keys understood by the appender facade.
pub mod keys {
    /// Short topic name resolved through the publisher
    pub const TOPIC_NAME: &str = "topic_name";
    /// Message subject
    pub const TOPIC_SUBJECT: &str = "topic_subject";
    /// Properties text handed to the evaluator
    pub const EVALUATOR_PROPERTIES: &str = "evaluator_properties";
    /// Minimum dispatch workers
    pub const POOL_MIN: &str = "pool_min";
    /// Maximum dispatch workers
    pub const POOL_MAX: &str = "pool_max";
    /// Most verbose level forwarded
    pub const THRESHOLD: &str = "threshold";
}

/// Appender options read from a flat map.
///
/// Absent options stay `None` so the facade builder keeps its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppenderOptions {
    /// Short topic name
    pub topic_name: Option<String>,
    /// Message subject
    pub topic_subject: Option<String>,
    /// Evaluator properties text
    pub evaluator_properties: Option<String>,
    /// Minimum dispatch workers
    pub pool_min: Option<usize>,
    /// Maximum dispatch workers
    pub pool_max: Option<usize>,
    /// Most verbose level forwarded
    pub threshold: Option<Level>,
}

impl AppenderOptions {
    /// Read the appender options from `map`.
    ///
    /// Unparseable sizes and levels are logged, reported, and left unset.
    pub fn from_map(map: &BTreeMap<String, String>) -> (Self, Vec<ConfigError>) {
        let mut errors = Vec::new();
        let text = |key: &str| {
            map.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut size = |key: &str| {
            let raw = map.get(key)?.trim();
            match raw.parse::<usize>() {
                Ok(value) => Some(value),
                Err(_) => {
                    errors.push(ConfigError::InvalidPoolSize {
                        key: key.to_string(),
                        value: raw.to_string(),
                    });
                    None
                }
            }
        };
        let pool_min = size(keys::POOL_MIN);
        let pool_max = size(keys::POOL_MAX);

        let threshold = map.get(keys::THRESHOLD).and_then(|raw| {
            raw.trim()
                .parse::<Level>()
                .map_err(|_| errors.push(ConfigError::InvalidThreshold(raw.trim().to_string())))
                .ok()
        });

        let options = Self {
            topic_name: text(keys::TOPIC_NAME),
            topic_subject: text(keys::TOPIC_SUBJECT),
            evaluator_properties: map.get(keys::EVALUATOR_PROPERTIES).cloned(),
            pool_min,
            pool_max,
            threshold,
        };

        for error in &errors {
            tracing::warn!(%error, "invalid appender option, using default");
        }

        (options, errors)
    }
}
