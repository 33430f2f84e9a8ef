//! Small helpers shared by the HTTP and OAuth layers
//!
//! Clock access, upstream error-body inspection, `retry-after` parsing and
//! UTF-8 safe truncation for log and error messages.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix epoch milliseconds
#[must_use]
pub fn now_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Pull the most useful message out of an Atlassian error body.
///
/// Jira reports `errorMessages: [..]` (and sometimes a field map under `errors`),
/// Confluence reports `message`, the OAuth endpoints report `error` /
/// `error_description`. A plain-text body arrives as a JSON string.
#[must_use]
pub fn extract_error_message(body: &serde_json::Value) -> Option<String> {
    if let Some(text) = body.as_str() {
        let trimmed = text.trim();
        return (!trimmed.is_empty()).then(|| trimmed.to_string());
    }

    if let Some(first) = body
        .get("errorMessages")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.iter().find_map(|m| m.as_str()))
    {
        return Some(first.to_string());
    }

    if let Some(errors) = body.get("errors").and_then(|v| v.as_object()) {
        let joined = errors
            .iter()
            .filter_map(|(field, msg)| msg.as_str().map(|m| format!("{field}: {m}")))
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            return Some(joined);
        }
    }

    ["message", "error_description", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Parse a `retry-after` header given in whole seconds.
///
/// Only positive integers are honoured; HTTP-date values and zero yield `None`.
#[must_use]
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Safely truncate a string at a UTF-8 character boundary.
#[inline]
#[must_use]
pub fn safe_truncate(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }

    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    &s[..boundary]
}

/// Truncate a string for display, appending "..." if anything was cut.
#[must_use]
pub fn truncate_for_display(s: &str, max_bytes: usize) -> String {
    let truncated = safe_truncate(s, max_bytes);
    if truncated.len() < s.len() {
        format!("{truncated}...")
    } else {
        truncated.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_jira_error_messages() {
        let body = json!({"errorMessages": ["Issue does not exist"], "errors": {}});
        assert_eq!(
            extract_error_message(&body).as_deref(),
            Some("Issue does not exist")
        );
    }

    #[test]
    fn test_extract_jira_field_errors() {
        let body = json!({"errorMessages": [], "errors": {"summary": "required"}});
        assert_eq!(
            extract_error_message(&body).as_deref(),
            Some("summary: required")
        );
    }

    #[test]
    fn test_extract_confluence_and_oauth_messages() {
        assert_eq!(
            extract_error_message(&json!({"message": "Page not found"})).as_deref(),
            Some("Page not found")
        );
        assert_eq!(
            extract_error_message(&json!({"error": "invalid_grant"})).as_deref(),
            Some("invalid_grant")
        );
        assert_eq!(
            extract_error_message(&json!("  Bad Gateway  ")).as_deref(),
            Some("Bad Gateway")
        );
        assert_eq!(extract_error_message(&json!({"foo": 1})), None);
        assert_eq!(extract_error_message(&json!("")), None);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("5")), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(Some(" 12 ")), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after(Some("0")), None);
        assert_eq!(parse_retry_after(Some("-3")), None);
        assert_eq!(
            parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")),
            None
        );
        assert_eq!(parse_retry_after(None), None);
    }

    #[test]
    fn test_truncate_for_display() {
        assert_eq!(truncate_for_display("This is a long message", 10), "This is a ...");
        assert_eq!(truncate_for_display("short", 10), "short");
        // 'é' is two bytes; cutting at 1 must not split it
        assert_eq!(safe_truncate("é", 1), "");
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(now_millis() > 1_577_836_800_000);
    }
}
