use gittuf_crypto::Signer;
use gittuf_git::{Oid, Repository};

use crate::error::{Error, Result};
use crate::metadata::{MetadataBody, Root, Timestamp};
use crate::refs::{POLICY, POLICY_STAGING};
use crate::rsl::Rsl;

use super::state::PolicyState;

/// Promote the staged policy (`policy-staging`) to applied (`policy`),
/// following the seven-step protocol in spec.md §4.5. On success, returns
/// the new policy commit id; an RSL reference entry recording it is also
/// appended so verification can locate the policy in effect at any RSL
/// entry.
pub fn apply(repo: &Repository, signer: Option<&dyn Signer>) -> Result<Oid> {
    let staging_tip = repo
        .resolve_reference(*POLICY_STAGING)?
        .ok_or_else(|| Error::NotFound("policy-staging is empty".to_string()))?;
    let staged_tree = repo.tree_of(staging_tip)?;
    let staged = PolicyState::from_tree(repo, staged_tree)?;
    let staged_root = staged.decode_root()?;
    staged_root.validate().map_err(|e| Error::corrupt("metadata/root", e.to_string()))?;

    let applied_tip = repo.resolve_reference(*POLICY)?;

    match applied_tip {
        None => bootstrap_verify(&staged, &staged_root)?,
        Some(applied_tip) => {
            let applied_tree = repo.tree_of(applied_tip)?;
            let applied = PolicyState::from_tree(repo, applied_tree)?;
            let applied_root = applied.decode_root()?;
            verify_transition(&applied, &applied_root, &staged, &staged_root)?;
        }
    }

    let tree = staged.to_tree(repo)?;
    let message = "gittuf: apply policy";
    let commit = repo.commit(tree, applied_tip, message, signer)?;
    repo.update_ref_cas(*POLICY, applied_tip, commit, message)?;

    Rsl::new(repo).append_reference(*POLICY, commit, signer)?;
    Ok(commit)
}

/// Step 1 special case: accept any fully self-consistent staged state whose
/// Root is signed by a threshold of its own keys. Also used by the
/// verification engine to validate a policy chain's genesis commit
/// independently of whether it went through this apply path.
pub fn bootstrap_verify(staged: &PolicyState, staged_root: &Root) -> Result<()> {
    check_expiry(staged_root, "metadata/root")?;
    let keys = staged_root
        .root_keys()
        .map_err(|e| Error::corrupt("metadata/root", e.to_string()))?
        .into_iter()
        .filter_map(|p| p.as_key().copied())
        .collect::<Vec<_>>();
    let threshold = staged_root
        .root_threshold()
        .map_err(|e| Error::corrupt("metadata/root", e.to_string()))?;

    staged.root.verify(&keys, threshold)?;
    verify_targets_against(staged, staged_root)
}

/// Steps 3-6: verify the staged Root rotates in under the applied Root's
/// threshold, every staged Targets document meets its role's threshold under
/// the *new* Root, and every changed document's version strictly increased.
/// Global-rule removal (step 6) needs no separate check here: global rules
/// live only inside Root, so any removal is already covered by the Root
/// rotation check in this same step.
fn verify_transition(
    applied: &PolicyState,
    applied_root: &Root,
    staged: &PolicyState,
    staged_root: &Root,
) -> Result<()> {
    check_expiry(staged_root, "metadata/root")?;
    let keys = applied_root
        .root_keys()
        .map_err(|e| Error::corrupt("metadata/root", e.to_string()))?
        .into_iter()
        .filter_map(|p| p.as_key().copied())
        .collect::<Vec<_>>();
    let threshold = applied_root
        .root_threshold()
        .map_err(|e| Error::corrupt("metadata/root", e.to_string()))?;
    staged.root.verify(&keys, threshold)?;

    verify_targets_against(staged, staged_root)?;

    if applied.root.payload != staged.root.payload {
        check_version(applied_root.version(), staged_root.version(), "metadata/root")?;
    }
    for (name, envelope) in &staged.targets {
        let staged_doc = staged.decode_targets(name)?;
        if let Ok(applied_envelope) = applied
            .targets
            .get(name)
            .ok_or_else(|| Error::NotFound(name.clone()))
        {
            if applied_envelope.payload == envelope.payload {
                continue;
            }
            let applied_doc = applied.decode_targets(name)?;
            check_version(applied_doc.version(), staged_doc.version(), &format!("metadata/{name}"))?;
        }
    }
    Ok(())
}

fn check_version(current: u64, found: u64, location: &str) -> Result<()> {
    if found <= current {
        return Err(Error::VersionRegression {
            location: location.to_string(),
            found,
            current,
        });
    }
    Ok(())
}

/// Spec.md §4.3: "Verification of a piece of metadata consults both: an
/// expired envelope is rejected".
fn check_expiry(body: &impl MetadataBody, location: &str) -> Result<()> {
    if body.is_expired_at(Timestamp::now()) {
        return Err(Error::Expired(location.to_string()));
    }
    Ok(())
}

/// Step 4: the top-level `targets` document meets the `targets` role's
/// threshold under `staged_root`'s principals; every delegated Targets
/// document meets the threshold of the parent rule(s) that delegate to it
/// (spec.md §4.5 step 4, and `delegation::document_authorizations`) — a
/// delegated document is trusted by the keyset its delegating parent names,
/// not by a Root signature.
fn verify_targets_against(staged: &PolicyState, staged_root: &Root) -> Result<()> {
    let delegated = super::delegation::document_authorizations(staged)?;
    for (name, envelope) in &staged.targets {
        check_expiry(&staged.decode_targets(name)?, &format!("metadata/{name}"))?;
        if name == crate::metadata::TARGETS_ROLE {
            let keys = staged_root
                .principals_for(crate::metadata::TARGETS_ROLE)
                .map_err(|e| Error::corrupt("metadata/root", e.to_string()))?
                .into_iter()
                .filter_map(|p| p.as_key().copied())
                .collect::<Vec<_>>();
            let threshold = staged_root
                .role(crate::metadata::TARGETS_ROLE)
                .map_err(|e| Error::corrupt("metadata/root", e.to_string()))?
                .threshold;
            envelope
                .verify(&keys, threshold)
                .map_err(|_| Error::InvalidSignature(format!("metadata/{name}")))?;
        } else {
            let auth = delegated.get(name).cloned().unwrap_or_default();
            super::delegation::require_nonzero_threshold(auth.threshold, &format!("metadata/{name}"))?;
            let keys = auth
                .key_ids
                .iter()
                .filter_map(|id| staged_root.keys.get(id))
                .filter_map(|p| p.as_key().copied())
                .collect::<Vec<_>>();
            envelope
                .verify(&keys, auth.threshold)
                .map_err(|_| Error::InvalidSignature(format!("metadata/{name}")))?;
        }
    }
    Ok(())
}
