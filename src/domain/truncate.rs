//! Byte-accurate payload limits.
//!
//! The transport rejects oversized payloads, so message and subject are cut to
//! a number of UTF-8 bytes (not characters) before a job is dispatched.

/// Maximum message size in bytes.
pub const MESSAGE_LIMIT: usize = 64 * 1024;

/// Maximum subject size in bytes.
pub const SUBJECT_LIMIT: usize = 100;

/// Cut `text` to at most `limit` bytes.
///
/// Text already within the limit is returned unchanged. Longer text is cut at
/// exactly `limit` bytes when that is a character boundary; otherwise the
/// partially cut character is dropped so the result stays valid UTF-8.
///
/// # Example
/// ```
/// use tracing_notifier::domain::truncate::truncate_to_byte_limit;
///
/// assert_eq!(truncate_to_byte_limit("abcdef", 4), "abcd");
/// assert_eq!(truncate_to_byte_limit("abc", 4), "abc");
/// // 'é' is two bytes; it does not fit after "abc" in four bytes
/// assert_eq!(truncate_to_byte_limit("abcé", 4), "abc");
/// ```
pub fn truncate_to_byte_limit(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Owned variant of [`truncate_to_byte_limit`] that reuses the allocation.
pub fn truncate_owned(mut text: String, limit: usize) -> String {
    let end = truncate_to_byte_limit(&text, limit).len();
    text.truncate(end);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_within_limit_is_noop() {
        assert_eq!(truncate_to_byte_limit("", 10), "");
        assert_eq!(truncate_to_byte_limit("hello", 5), "hello");
        assert_eq!(truncate_to_byte_limit("hello", 100), "hello");
    }

    #[test]
    fn test_truncation_is_idempotent() {
        let once = truncate_to_byte_limit("a long subject line", 6);
        let twice = truncate_to_byte_limit(once, 6);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_ascii_cut_is_exact() {
        let subject = "x".repeat(250);
        let cut = truncate_to_byte_limit(&subject, SUBJECT_LIMIT);
        assert_eq!(cut.len(), SUBJECT_LIMIT);
    }

    #[test]
    fn test_message_limit() {
        let message = "m".repeat(MESSAGE_LIMIT + 1);
        assert_eq!(truncate_to_byte_limit(&message, MESSAGE_LIMIT).len(), MESSAGE_LIMIT);
    }

    #[test]
    fn test_multibyte_boundary() {
        // Each 'ж' is 2 bytes, each '日' is 3 bytes
        assert_eq!(truncate_to_byte_limit("жжж", 4), "жж");
        assert_eq!(truncate_to_byte_limit("жжж", 5), "жж");
        assert_eq!(truncate_to_byte_limit("日本語", 7), "日本");
        assert_eq!(truncate_to_byte_limit("日本語", 2), "");
    }

    #[test]
    fn test_multibyte_never_exceeds_limit() {
        let text = "🚨 alert ".repeat(40);
        for limit in 0..text.len() {
            let cut = truncate_to_byte_limit(&text, limit);
            assert!(cut.len() <= limit);
            assert!(limit - cut.len() < 4);
            assert!(text.starts_with(cut));
        }
    }

    #[test]
    fn test_owned_variant() {
        assert_eq!(truncate_owned("abcdef".to_string(), 3), "abc");
        assert_eq!(truncate_owned("ab".to_string(), 3), "ab");
    }
}
