//! Word-boundary truncation with a suffix marker.

use std::borrow::Cow;

/// Caps `content` at `limit` characters.
///
/// Input of at most `limit` characters is returned untouched. Longer input
/// keeps the longest prefix that ends before a space and fits in
/// `limit - suffix` characters (a hard cut when no space is found), followed
/// by `suffix`. The result never exceeds `max(limit, suffix)` characters, so
/// truncating it again with the same limit returns it unchanged.
pub fn truncate<'a>(content: &'a str, limit: usize, suffix: &str) -> Cow<'a, str> {
    if content.chars().count() <= limit {
        return Cow::Borrowed(content);
    }

    let budget = limit.saturating_sub(suffix.chars().count());
    let window = &content[..byte_index(content, budget + 1)];
    let kept = match window.rfind(' ') {
        Some(space) => &window[..space],
        None => &content[..byte_index(content, budget)],
    };

    let mut out = String::with_capacity(kept.len() + suffix.len());
    out.push_str(kept);
    out.push_str(suffix);
    Cow::Owned(out)
}

/// Byte offset of the `chars`-th character, or the end of `s`.
fn byte_index(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}
