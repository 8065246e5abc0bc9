//! UTF-8–safe text helpers.
//!
//! `&str[..n]` panics when `n` falls inside a multi-byte character, so every
//! cut goes through [`floor_boundary`].

/// Largest index `<= max` that is a char boundary of `s`.
#[inline]
pub fn floor_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Prefix of `s` at most `max_bytes` long, never splitting a character.
#[inline]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    &s[..floor_boundary(s, max_bytes)]
}

/// One-line summary of an arbitrary message.
///
/// Whitespace runs (including newlines) collapse to a single space, and the
/// result is cut to `max_bytes` with a trailing `...` when it overflows.
/// Used to shape raw agent failures before they reach callers or job records.
pub fn summarize(message: &str, max_bytes: usize) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= max_bytes {
        return collapsed;
    }
    const SUFFIX: &str = "...";
    let budget = max_bytes.saturating_sub(SUFFIX.len());
    format!("{}{SUFFIX}", truncate_str(&collapsed, budget))
}
