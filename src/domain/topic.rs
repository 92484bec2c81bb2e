//! Topic handles for the publish collaborator.

use std::fmt;

/// Fully qualified identifier of a pub/sub topic.
///
/// Topics are addressed by an ARN-style identifier whose last `:`-separated
/// segment is the short topic name, e.g. `arn:aws:sns:us-east-1:123:alerts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicHandle {
    arn: String,
}

impl TopicHandle {
    /// Create a handle from a fully qualified identifier.
    pub fn new(arn: impl Into<String>) -> Self {
        Self { arn: arn.into() }
    }

    /// The fully qualified identifier.
    pub fn arn(&self) -> &str {
        &self.arn
    }

    /// The short topic name.
    pub fn name(&self) -> &str {
        topic_name_from_arn(&self.arn)
    }
}

impl fmt::Display for TopicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.arn)
    }
}

/// Extract the short topic name from an ARN.
///
/// `"arn:aws:sns:us-east-1:1234567890123456:mytopic"` becomes `"mytopic"`.
/// Input without a `:` is returned unchanged.
pub fn topic_name_from_arn(arn: &str) -> &str {
    match arn.rfind(':') {
        Some(index) => &arn[index + 1..],
        None => arn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_name_from_arn() {
        assert_eq!(
            topic_name_from_arn("arn:aws:sns:us-east-1:1234567890123456:mytopic"),
            "mytopic"
        );
        assert_eq!(topic_name_from_arn("plain"), "plain");
        assert_eq!(topic_name_from_arn("trailing:"), "");
    }

    #[test]
    fn test_handle() {
        let topic = TopicHandle::new("arn:topic:alerts");
        assert_eq!(topic.arn(), "arn:topic:alerts");
        assert_eq!(topic.name(), "alerts");
        assert_eq!(topic.to_string(), "arn:topic:alerts");
    }
}
