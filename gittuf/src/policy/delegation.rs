use std::collections::BTreeSet;

use gittuf_crypto::PrincipalId;

use crate::error::{Error, Result};
use crate::metadata::{Root, TARGETS_ROLE};

use super::state::PolicyState;

/// The resolved authorization for a change to some reference: the union of
/// every matching delegation rule's authorized keys, at the maximum of their
/// thresholds (design decision recorded in DESIGN.md: overlapping delegated
/// Targets rules combine rather than picking the most specific one).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Authorization {
    pub key_ids: BTreeSet<PrincipalId>,
    pub threshold: usize,
}

/// Resolve the delegation-implied required principal set and threshold for
/// `reference` (spec.md §4.5 "Delegation resolution"). Starts at the
/// top-level Targets document and follows delegated names into further
/// Targets documents present in `state.targets`, combining each level's
/// contribution into the running union/max.
pub fn resolve(state: &PolicyState, reference: &str) -> Result<Authorization> {
    let mut visited = BTreeSet::new();
    let mut out = Authorization::default();
    resolve_into(state, TARGETS_ROLE, reference, &mut visited, &mut out)?;
    Ok(out)
}

fn resolve_into(
    state: &PolicyState,
    document: &str,
    reference: &str,
    visited: &mut BTreeSet<String>,
    out: &mut Authorization,
) -> Result<()> {
    if !visited.insert(document.to_string()) {
        return Ok(());
    }
    let targets = state.decode_targets(document)?;

    for rule in targets.matching_rules(reference) {
        out.key_ids.extend(rule.authorized_key_ids.iter().cloned());
        out.threshold = out.threshold.max(rule.threshold);

        if state.targets.contains_key(&rule.name) && rule.name != document {
            resolve_into(state, &rule.name, reference, visited, out)?;
        }
    }
    Ok(())
}

/// The envelope-trust keyset for every delegated Targets document reachable
/// from the top-level `targets` document (spec.md §4.5 step 4: a delegated
/// document is authorized by the delegating parent's keys, the same keys
/// `resolve` credits toward a matching reference — not by the Root role).
/// Built the same way `resolve` walks the delegation tree, but collecting
/// every rule regardless of which reference it matches, since this answers
/// "who may sign this document" rather than "who may sign this reference".
pub fn document_authorizations(state: &PolicyState) -> Result<std::collections::BTreeMap<String, Authorization>> {
    let mut visited = BTreeSet::new();
    let mut out = std::collections::BTreeMap::new();
    collect_document_authorizations(state, TARGETS_ROLE, &mut visited, &mut out)?;
    Ok(out)
}

fn collect_document_authorizations(
    state: &PolicyState,
    document: &str,
    visited: &mut BTreeSet<String>,
    out: &mut std::collections::BTreeMap<String, Authorization>,
) -> Result<()> {
    if !visited.insert(document.to_string()) {
        return Ok(());
    }
    let targets = state.decode_targets(document)?;
    for rule in &targets.delegations {
        if state.targets.contains_key(&rule.name) && rule.name != document {
            let entry = out.entry(rule.name.clone()).or_default();
            entry.key_ids.extend(rule.authorized_key_ids.iter().cloned());
            entry.threshold = entry.threshold.max(rule.threshold);
            collect_document_authorizations(state, &rule.name, visited, out)?;
        }
    }
    Ok(())
}

/// Every global Threshold rule matching `reference`, each contributing its
/// own minimum distinct-principal count on top of delegation (spec.md §4.7
/// step d: "meet the delegated threshold *and* every global Threshold rule
/// matching R").
pub fn global_thresholds(root: &Root, reference: &str) -> Vec<usize> {
    root.global_rules
        .iter()
        .filter_map(|rule| match rule {
            crate::metadata::GlobalRule::Threshold { threshold, .. } if rule.matches(reference) => {
                Some(*threshold)
            }
            _ => None,
        })
        .collect()
}

/// Whether any global BlockForcePushes rule matches `reference`.
pub fn force_pushes_blocked(root: &Root, reference: &str) -> bool {
    root.global_rules.iter().any(|rule| {
        matches!(rule, crate::metadata::GlobalRule::BlockForcePushes { .. }) && rule.matches(reference)
    })
}

pub fn require_nonzero_threshold(threshold: usize, location: &str) -> Result<()> {
    if threshold == 0 {
        return Err(Error::InvalidThreshold(format!(
            "no delegation rule authorizes changes to '{location}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Rule, Timestamp};
    use gittuf_crypto::test::signer::MockSigner;

    #[test]
    fn test_resolve_union_across_nested_delegation() {
        let signer = MockSigner::from_seed([1; 32]);
        let mut state = PolicyState::bootstrap(&signer, Timestamp(u64::MAX)).unwrap();

        let mut top = state.decode_targets("targets").unwrap();
        top.add_rule(Rule {
            name: "release-team".to_string(),
            protected_namespace_patterns: vec!["refs/heads/release/*".to_string()],
            authorized_key_ids: vec![PrincipalId::from("outer-key")],
            threshold: 1,
            terminating: false,
        })
        .unwrap();
        state.set_targets("targets", &top, &signer).unwrap();

        let mut delegated = crate::metadata::Targets::new(Timestamp(u64::MAX));
        delegated
            .add_rule(Rule {
                name: "leaf".to_string(),
                protected_namespace_patterns: vec!["refs/heads/release/*".to_string()],
                authorized_key_ids: vec![PrincipalId::from("inner-key")],
                threshold: 2,
                terminating: true,
            })
            .unwrap();
        state.set_targets("release-team", &delegated, &signer).unwrap();

        let auth = resolve(&state, "refs/heads/release/1.0").unwrap();
        assert_eq!(auth.threshold, 2);
        assert!(auth.key_ids.contains(&PrincipalId::from("outer-key")));
        assert!(auth.key_ids.contains(&PrincipalId::from("inner-key")));
    }

    #[test]
    fn test_resolve_empty_for_unmatched_reference() {
        let signer = MockSigner::from_seed([1; 32]);
        let state = PolicyState::bootstrap(&signer, Timestamp(u64::MAX)).unwrap();
        let auth = resolve(&state, "refs/heads/anything").unwrap();
        assert!(auth.key_ids.is_empty());
        assert_eq!(auth.threshold, 0);
    }

    #[test]
    fn test_document_authorizations_credits_delegating_parent_not_root() {
        let signer = MockSigner::from_seed([1; 32]);
        let mut state = PolicyState::bootstrap(&signer, Timestamp(u64::MAX)).unwrap();

        let mut top = state.decode_targets("targets").unwrap();
        top.add_rule(Rule {
            name: "release-team".to_string(),
            protected_namespace_patterns: vec!["refs/heads/release/*".to_string()],
            authorized_key_ids: vec![PrincipalId::from("outer-key")],
            threshold: 1,
            terminating: false,
        })
        .unwrap();
        state.set_targets("targets", &top, &signer).unwrap();

        let delegated = crate::metadata::Targets::new(Timestamp(u64::MAX));
        state.set_targets("release-team", &delegated, &signer).unwrap();

        let auths = document_authorizations(&state).unwrap();
        let auth = auths.get("release-team").unwrap();
        assert_eq!(auth.threshold, 1);
        assert!(auth.key_ids.contains(&PrincipalId::from("outer-key")));
    }

    #[test]
    fn test_require_nonzero_threshold_rejects_zero() {
        assert!(require_nonzero_threshold(0, "refs/heads/main").is_err());
        assert!(require_nonzero_threshold(1, "refs/heads/main").is_ok());
    }
}
