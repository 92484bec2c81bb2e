//! Event signature computation for log deduplication.
//!
//! A signature reduces a log record to a string key using a field mask:
//! - Each masked attribute contributes its value followed by `/`
//! - Attributes are visited in `SignatureField` declaration order
//! - Absent attributes contribute an empty segment
//! - A masked stack trace contributes every line, each prefixed by `/`
//!
//! Records with the same signature are considered duplicates for throttling.
//! The mapping is intentionally lossy: anything outside the mask is ignored.

use crate::domain::record::LogRecord;
use std::fmt;
use std::str::FromStr;

/// Delimiter placed after every signature segment.
pub const SEGMENT_DELIMITER: char = '/';

/// A record attribute that can take part in a signature.
///
/// The declaration order is the order in which segments are concatenated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignatureField {
    /// Level name
    Level,
    /// Logger name (event target)
    LoggerName,
    /// Thread name
    ThreadName,
    /// Source file
    FileName,
    /// Type or module path
    ClassName,
    /// Function or span name
    MethodName,
    /// Source line
    LineNumber,
    /// Full stack trace
    StackTrace,
}

impl SignatureField {
    /// All fields in declaration order.
    pub const ALL: [SignatureField; 8] = [
        SignatureField::Level,
        SignatureField::LoggerName,
        SignatureField::ThreadName,
        SignatureField::FileName,
        SignatureField::ClassName,
        SignatureField::MethodName,
        SignatureField::LineNumber,
        SignatureField::StackTrace,
    ];

    /// Configuration name of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureField::Level => "LEVEL",
            SignatureField::LoggerName => "LOGGER_NAME",
            SignatureField::ThreadName => "THREAD_NAME",
            SignatureField::FileName => "FILE_NAME",
            SignatureField::ClassName => "CLASS_NAME",
            SignatureField::MethodName => "METHOD_NAME",
            SignatureField::LineNumber => "LINE_NUMBER",
            SignatureField::StackTrace => "STACK_TRACE",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for SignatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a field name is not a known `SignatureField`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFieldError {
    name: String,
}

impl UnknownFieldError {
    /// The name that failed to parse.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for UnknownFieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown signature field: {:?}", self.name)
    }
}

impl std::error::Error for UnknownFieldError {}

impl FromStr for SignatureField {
    type Err = UnknownFieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        SignatureField::ALL
            .into_iter()
            .find(|field| field.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownFieldError {
                name: name.to_string(),
            })
    }
}

/// The set of attributes included in a signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldMask(u8);

impl FieldMask {
    /// A mask selecting nothing.
    pub const fn empty() -> Self {
        FieldMask(0)
    }

    /// Build a mask from a list of fields. Duplicates are ignored.
    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = SignatureField>,
    {
        fields.into_iter().fold(Self::empty(), FieldMask::with)
    }

    /// Return a copy of this mask with `field` added.
    pub fn with(self, field: SignatureField) -> Self {
        FieldMask(self.0 | field.bit())
    }

    /// Check whether `field` is selected.
    pub fn contains(&self, field: SignatureField) -> bool {
        self.0 & field.bit() != 0
    }

    /// Check whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Selected fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = SignatureField> + '_ {
        SignatureField::ALL
            .into_iter()
            .filter(move |field| self.contains(*field))
    }
}

impl Default for FieldMask {
    /// `LOGGER_NAME` and `LINE_NUMBER`.
    fn default() -> Self {
        FieldMask::from_fields([SignatureField::LoggerName, SignatureField::LineNumber])
    }
}

impl fmt::Display for FieldMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, field) in self.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_str(field.as_str())?;
        }
        Ok(())
    }
}

impl fmt::Debug for FieldMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldMask({})", self)
    }
}

/// A key identifying a class of duplicate log records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    /// Compute the signature of `record` under `mask`.
    ///
    /// Never fails: absent attributes become empty segments. The stack trace
    /// is appended in full; payload size limits are enforced at dispatch.
    pub fn build(record: &LogRecord, mask: FieldMask) -> Self {
        let mut text = String::with_capacity(128);

        for field in mask.iter() {
            match field {
                SignatureField::Level => push_segment(&mut text, &record.level),
                SignatureField::LoggerName => push_segment(&mut text, &record.logger_name),
                SignatureField::ThreadName => {
                    push_segment(&mut text, record.thread_name.as_deref().unwrap_or(""))
                }
                SignatureField::FileName => {
                    push_segment(&mut text, record.file.as_deref().unwrap_or(""))
                }
                SignatureField::ClassName => {
                    push_segment(&mut text, record.class_name.as_deref().unwrap_or(""))
                }
                SignatureField::MethodName => {
                    push_segment(&mut text, record.method_name.as_deref().unwrap_or(""))
                }
                SignatureField::LineNumber => {
                    if let Some(line) = record.line {
                        text.push_str(&line.to_string());
                    }
                    text.push(SEGMENT_DELIMITER);
                }
                SignatureField::StackTrace => {
                    for entry in record.stack_trace.iter().flatten() {
                        text.push(SEGMENT_DELIMITER);
                        text.push_str(entry);
                    }
                }
            }
        }

        Signature(text)
    }

    /// Wrap an already computed key.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Signature(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the key in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the key is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn push_segment(text: &mut String, value: &str) {
    text.push_str(value);
    text.push(SEGMENT_DELIMITER);
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
