use gittuf_crypto::PrincipalId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::timestamp::Timestamp;
use super::MetadataBody;

#[derive(Debug, Error)]
pub enum TargetsError {
    #[error("delegation rule '{0}' has a threshold of zero")]
    ZeroThreshold(String),
    #[error("delegation rule '{0}' has threshold {1} but only {2} authorized keys")]
    ThresholdExceedsKeys(String, usize, usize),
    #[error("delegation rule '{0}' names no protected namespace patterns")]
    NoPatterns(String),
}

/// A single delegation entry (spec.md §3 "Targets Metadata", §4.5
/// "Delegation rules are evaluated in order"). Rules within one Targets
/// document are ordered; the first matching rule governs unless it is
/// non-terminating, in which case later matches are also consulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub protected_namespace_patterns: Vec<String>,
    pub authorized_key_ids: Vec<PrincipalId>,
    pub threshold: usize,
    #[serde(default)]
    pub terminating: bool,
}

impl Rule {
    pub fn validate(&self) -> Result<(), TargetsError> {
        if self.protected_namespace_patterns.is_empty() {
            return Err(TargetsError::NoPatterns(self.name.clone()));
        }
        if self.threshold == 0 {
            return Err(TargetsError::ZeroThreshold(self.name.clone()));
        }
        if self.threshold > self.authorized_key_ids.len() {
            return Err(TargetsError::ThresholdExceedsKeys(
                self.name.clone(),
                self.threshold,
                self.authorized_key_ids.len(),
            ));
        }
        Ok(())
    }

    pub fn matches(&self, namespace: &str) -> bool {
        super::pattern::matches_any(self.protected_namespace_patterns.iter().map(String::as_str), namespace)
    }
}

/// The delegation tree for a repository or a sub-namespace of one
/// (spec.md §3 "Targets Metadata"). The top-level Targets document lives at
/// `/metadata/targets`; delegated documents live at
/// `/metadata/<delegated-name>` per the Policy State tree layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Targets {
    pub version: u64,
    pub expires: Timestamp,
    pub delegations: Vec<Rule>,
}

impl Targets {
    pub fn new(expires: Timestamp) -> Self {
        Self {
            version: 1,
            expires,
            delegations: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), TargetsError> {
        self.delegations.iter().try_for_each(Rule::validate)
    }

    /// Rules matching `namespace`, in declaration order, stopping after the
    /// first `terminating` match (inclusive).
    pub fn matching_rules(&self, namespace: &str) -> Vec<&Rule> {
        let mut out = Vec::new();
        for rule in &self.delegations {
            if rule.matches(namespace) {
                let terminating = rule.terminating;
                out.push(rule);
                if terminating {
                    break;
                }
            }
        }
        out
    }

    pub fn add_rule(&mut self, rule: Rule) -> Result<(), TargetsError> {
        rule.validate()?;
        self.delegations.push(rule);
        Ok(())
    }

    pub fn remove_rule(&mut self, name: &str) {
        self.delegations.retain(|r| r.name != name);
    }
}

impl MetadataBody for Targets {
    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> Timestamp {
        self.expires
    }
}
