use serde::{Deserialize, Serialize};

/// A rule that applies across the whole delegation tree, independent of
/// which Targets document matched (spec.md §3 "Global rules", §4.6). Unlike
/// delegation rules, global rules are declared only in Root metadata and
/// bind every namespace they match regardless of who owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum GlobalRule {
    /// At least `threshold` distinct principals must have signed off on any
    /// change to a ref matching one of `patterns`, on top of whatever
    /// delegation rule already governs it.
    Threshold {
        patterns: Vec<String>,
        threshold: usize,
    },
    /// Updates to a ref matching one of `patterns` must be fast-forwards:
    /// the new tip must be a descendant of the ref's previous tip.
    BlockForcePushes { patterns: Vec<String> },
}

impl GlobalRule {
    pub fn patterns(&self) -> &[String] {
        match self {
            GlobalRule::Threshold { patterns, .. } => patterns,
            GlobalRule::BlockForcePushes { patterns } => patterns,
        }
    }

    pub fn matches(&self, namespace: &str) -> bool {
        super::pattern::matches_any(self.patterns().iter().map(String::as_str), namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_rule_matches_patterns() {
        let rule = GlobalRule::Threshold {
            patterns: vec!["refs/heads/main".to_string()],
            threshold: 2,
        };
        assert!(rule.matches("refs/heads/main"));
        assert!(!rule.matches("refs/heads/dev"));
    }

    #[test]
    fn test_block_force_pushes_matches_patterns() {
        let rule = GlobalRule::BlockForcePushes {
            patterns: vec!["refs/heads/*".to_string()],
        };
        assert!(rule.matches("refs/heads/release"));
    }
}
