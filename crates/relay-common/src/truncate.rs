//! Truncation helpers shared by the Request Logger and Streaming Tee
//! (spec.md §4.F, §4.G).

/// Sentinel appended to a logged response body when it was cut short.
pub const TRUNCATION_MARKER: &str = "\n[TRUNCATED: Response exceeded maximum log size]";

/// Truncate a UTF-8-lossy string to at most `limit` bytes, splitting on a
/// char boundary.
pub fn truncate_str(value: &str, limit: usize) -> String {
    if value.len() <= limit {
        return value.to_string();
    }
    let mut end = limit;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].to_string()
}

/// Truncate bytes to at most `limit`, append the truncation marker, and
/// decode as UTF-8 (lossily) — used for logged response bodies.
pub fn truncate_body_with_marker(body: &[u8], limit: usize) -> String {
    if body.len() <= limit {
        return String::from_utf8_lossy(body).to_string();
    }
    let truncated = truncate_str(&String::from_utf8_lossy(body), limit);
    format!("{truncated}{TRUNCATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_is_untouched() {
        assert_eq!(truncate_body_with_marker(b"hello", 100), "hello");
    }

    #[test]
    fn long_body_gets_marker() {
        let body = "x".repeat(10);
        let out = truncate_body_with_marker(body.as_bytes(), 4);
        assert!(out.starts_with("xxxx"));
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let value = "héllo";
        let out = truncate_str(value, 2);
        assert!(value.is_char_boundary(out.len()));
    }
}
