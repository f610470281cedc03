//! UTF-8-safe output clamping.
//!
//! Tool output is appended to the transcript and re-sent to the model every
//! turn, so unbounded output is a cost problem. Byte-indexed slicing panics
//! inside multi-byte characters; these helpers snap to char boundaries.

/// Longest prefix of `s` that is at most `max_bytes` bytes and does not
/// split a character.
#[inline]
pub fn prefix_at_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Clamp `s` to `max_bytes`, appending `marker` when content was dropped.
///
/// The result is at most `max_bytes` bytes including the marker. Strings
/// that already fit are returned unchanged.
pub fn clamp_output(s: &str, max_bytes: usize, marker: &str) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let budget = max_bytes.saturating_sub(marker.len());
    format!("{}{marker}", prefix_at_boundary(s, budget))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string_untouched() {
        assert_eq!(prefix_at_boundary("abc", 10), "abc");
        assert_eq!(clamp_output("abc", 10, "…"), "abc");
    }

    #[test]
    fn ascii_cut() {
        assert_eq!(prefix_at_boundary("hello world", 5), "hello");
    }

    #[test]
    fn snaps_back_inside_multibyte() {
        // 'é' is two bytes at indices 3..5
        let s = "café!";
        assert_eq!(prefix_at_boundary(s, 4), "caf");
        assert_eq!(prefix_at_boundary(s, 5), "café");
    }

    #[test]
    fn four_byte_char() {
        let s = "ab🦀cd";
        assert_eq!(prefix_at_boundary(s, 3), "ab");
        assert_eq!(prefix_at_boundary(s, 6), "ab🦀");
    }

    #[test]
    fn zero_budget() {
        assert_eq!(prefix_at_boundary("abc", 0), "");
    }

    #[test]
    fn clamp_includes_marker_in_budget() {
        let out = clamp_output("0123456789", 8, "[cut]");
        assert_eq!(out, "012[cut]");
        assert!(out.len() <= 8);
    }

    #[test]
    fn clamp_marker_longer_than_budget() {
        assert_eq!(clamp_output("abcdef", 3, "[truncated]"), "[truncated]");
    }
}
