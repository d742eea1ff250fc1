//! Host-pattern glob matching for the policy engine's allow-lists.
//!
//! This is deliberately not a filesystem glob: hosts have no path
//! separators, so `*` simply matches any (possibly empty) run of
//! characters. A pattern is split on `*` and the resulting literal
//! pieces are matched prefix-anchored, suffix-anchored, and the
//! interior pieces greedily left-to-right.

/// Returns `true` if `pattern` matches `text` under host-glob semantics.
///
/// `*` matches any substring, including the empty string. A pattern with
/// no `*` must match `text` exactly.
#[must_use]
pub fn matches(pattern: &str, text: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == text;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = text;

    // First piece must anchor the start (unless the pattern starts with `*`).
    if let Some(first) = parts.first() {
        if !first.is_empty() {
            match rest.strip_prefix(first) {
                Some(r) => rest = r,
                None => return false,
            }
        }
    }

    // Last piece must anchor the end (unless the pattern ends with `*`).
    if let Some(last) = parts.last() {
        if !last.is_empty() {
            match rest.strip_suffix(last) {
                Some(r) => rest = r,
                None => return false,
            }
        }
    }

    // Interior pieces (neither first nor last) must appear in order,
    // greedily consuming from the left.
    let interior = if parts.len() > 2 {
        &parts[1..parts.len() - 1]
    } else {
        &[][..]
    };

    for piece in interior {
        if piece.is_empty() {
            continue;
        }
        match rest.find(piece) {
            Some(idx) => rest = &rest[idx + piece.len()..],
            None => return false,
        }
    }

    true
}

/// Returns `true` if any pattern in `patterns` matches `text`.
#[must_use]
pub fn matches_any<'a>(patterns: impl IntoIterator<Item = &'a str>, text: &str) -> bool {
    patterns.into_iter().any(|p| matches(p, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_without_wildcard() {
        assert!(matches("api.openai.com", "api.openai.com"));
        assert!(!matches("api.openai.com", "api.openai.com.evil"));
    }

    #[test]
    fn suffix_wildcard() {
        assert!(matches("*.example.com", "a.example.com"));
        assert!(matches("*.example.com", "a.b.example.com"));
        assert!(!matches("*.example.com", "example.com"));
    }

    #[test]
    fn prefix_wildcard() {
        assert!(matches("prefix.*", "prefix.anything"));
        assert!(!matches("prefix.*", "notprefix.anything"));
    }

    #[test]
    fn interior_wildcards() {
        assert!(matches("api-*-*.example.com", "api-v1-prod.example.com"));
        assert!(!matches("api-*-*.example.com", "api-v1.example.com"));
    }

    #[test]
    fn bare_wildcard_matches_everything() {
        assert!(matches("*", "anything.at.all"));
        assert!(matches("*", ""));
    }
}
