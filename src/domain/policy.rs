//! Retention policy for throttled signatures.
//!
//! A signature stays "seen" for one retention period after it was recorded.
//! The period is expressed as an amount of a `TimeUnit`, matching the way the
//! appender is configured (`period=10`, `unit=MINUTES`).

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Duration unit accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// Nanoseconds
    Nanoseconds,
    /// Microseconds
    Microseconds,
    /// Milliseconds
    Milliseconds,
    /// Seconds
    Seconds,
    /// Minutes
    Minutes,
    /// Hours
    Hours,
    /// Days
    Days,
}

impl TimeUnit {
    const ALL: [TimeUnit; 7] = [
        TimeUnit::Nanoseconds,
        TimeUnit::Microseconds,
        TimeUnit::Milliseconds,
        TimeUnit::Seconds,
        TimeUnit::Minutes,
        TimeUnit::Hours,
        TimeUnit::Days,
    ];

    /// Configuration name of the unit.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "NANOSECONDS",
            TimeUnit::Microseconds => "MICROSECONDS",
            TimeUnit::Milliseconds => "MILLISECONDS",
            TimeUnit::Seconds => "SECONDS",
            TimeUnit::Minutes => "MINUTES",
            TimeUnit::Hours => "HOURS",
            TimeUnit::Days => "DAYS",
        }
    }

    /// Convert `amount` of this unit to a `Duration`.
    ///
    /// Returns `None` if the result does not fit in a `Duration`.
    pub fn to_duration(&self, amount: u64) -> Option<Duration> {
        let secs_per = |factor: u64| amount.checked_mul(factor).map(Duration::from_secs);
        match self {
            TimeUnit::Nanoseconds => Some(Duration::from_nanos(amount)),
            TimeUnit::Microseconds => Some(Duration::from_micros(amount)),
            TimeUnit::Milliseconds => Some(Duration::from_millis(amount)),
            TimeUnit::Seconds => Some(Duration::from_secs(amount)),
            TimeUnit::Minutes => secs_per(60),
            TimeUnit::Hours => secs_per(60 * 60),
            TimeUnit::Days => secs_per(24 * 60 * 60),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a unit name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownUnitError {
    name: String,
}

impl fmt::Display for UnknownUnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown time unit: {:?}", self.name)
    }
}

impl std::error::Error for UnknownUnitError {}

impl FromStr for TimeUnit {
    type Err = UnknownUnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        TimeUnit::ALL
            .into_iter()
            .find(|unit| unit.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownUnitError {
                name: name.to_string(),
            })
    }
}

/// Error returned when a retention policy cannot be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionError {
    /// The retention period must be greater than zero
    ZeroPeriod,
    /// `amount` of `unit` does not fit in a `Duration`
    Overflow {
        /// Requested amount
        amount: u64,
        /// Requested unit
        unit: TimeUnit,
    },
}

impl fmt::Display for RetentionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionError::ZeroPeriod => write!(f, "retention period must be greater than 0"),
            RetentionError::Overflow { amount, unit } => {
                write!(f, "retention period {} {} is too large", amount, unit)
            }
        }
    }
}

impl std::error::Error for RetentionError {}

/// How long a signature is remembered after it was recorded.
///
/// # Example
/// ```
/// use tracing_notifier::{RetentionPolicy, TimeUnit};
/// use std::time::{Duration, Instant};
///
/// let policy = RetentionPolicy::from_parts(400, TimeUnit::Milliseconds).unwrap();
/// let inserted = Instant::now();
///
/// assert!(!policy.is_expired(inserted, inserted + Duration::from_millis(399)));
/// assert!(policy.is_expired(inserted, inserted + Duration::from_millis(400)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    period: Duration,
}

impl RetentionPolicy {
    /// Create a policy with the given period.
    ///
    /// # Errors
    /// Returns `RetentionError::ZeroPeriod` if `period` is zero.
    pub fn new(period: Duration) -> Result<Self, RetentionError> {
        if period.is_zero() {
            return Err(RetentionError::ZeroPeriod);
        }
        Ok(Self { period })
    }

    /// Create a policy from an amount and a unit.
    ///
    /// # Errors
    /// Returns `RetentionError` if the amount is zero or overflows.
    pub fn from_parts(amount: u64, unit: TimeUnit) -> Result<Self, RetentionError> {
        let period = unit
            .to_duration(amount)
            .ok_or(RetentionError::Overflow { amount, unit })?;
        Self::new(period)
    }

    /// The retention period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Check whether an entry recorded at `inserted_at` has expired at `now`.
    ///
    /// An entry is visible for strictly less than one period.
    pub fn is_expired(&self, inserted_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(inserted_at) >= self.period
    }
}

impl Default for RetentionPolicy {
    /// Ten minutes.
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10 * 60),
        }
    }
}
