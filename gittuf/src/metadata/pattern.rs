//! Glob-style matching of reference names and paths against delegation and
//! global-rule patterns (spec.md §4.5 "patterns match Git reference names
//! and/or path globs"). A single `*` matches any run of characters,
//! including `/`; this is deliberately simpler than full git refspec
//! globbing since gittuf's patterns only ever need to say "this ref, or
//! anything under this prefix".

/// Whether `pattern` matches `candidate`. `*` matches zero or more of any
/// character.
pub fn matches(pattern: &str, candidate: &str) -> bool {
    match_bytes(pattern.as_bytes(), candidate.as_bytes())
}

fn match_bytes(pattern: &[u8], candidate: &[u8]) -> bool {
    match pattern.split_first() {
        None => candidate.is_empty(),
        Some((b'*', rest)) => {
            if match_bytes(rest, candidate) {
                return true;
            }
            if let Some((_, tail)) = candidate.split_first() {
                return match_bytes(pattern, tail);
            }
            false
        }
        Some((&p, rest)) => match candidate.split_first() {
            Some((&c, tail)) if p == c => match_bytes(rest, tail),
            _ => false,
        },
    }
}

/// Whether any pattern in `patterns` matches `candidate`.
pub fn matches_any<'a>(patterns: impl IntoIterator<Item = &'a str>, candidate: &str) -> bool {
    patterns.into_iter().any(|p| matches(p, candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact() {
        assert!(matches("refs/heads/main", "refs/heads/main"));
        assert!(!matches("refs/heads/main", "refs/heads/dev"));
    }

    #[test]
    fn test_prefix_star() {
        assert!(matches("refs/heads/*", "refs/heads/main"));
        assert!(matches("refs/heads/*", "refs/heads/feature/x"));
        assert!(!matches("refs/heads/*", "refs/tags/v1"));
    }

    #[test]
    fn test_bare_star() {
        assert!(matches("*", "anything/at/all"));
    }

    #[test]
    fn test_matches_any() {
        assert!(matches_any(["refs/tags/*", "refs/heads/*"], "refs/heads/main"));
        assert!(!matches_any(["refs/tags/*"], "refs/heads/main"));
    }
}
