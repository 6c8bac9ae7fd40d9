use gittuf_git::{Oid, Repository};

use crate::error::{Error, Result};
use crate::metadata::MetadataBody;

use super::state::PolicyState;

/// Walk successive applied policy commits between two versions and
/// reconfirm each transition: every step must be authorized by the
/// *previous* state's Root (spec.md §4.5 "State transition history"). This
/// is what lets the verification engine traverse the RSL and change policy
/// safely without re-deriving trust from scratch at every step.
pub fn verify_trusted_states(repo: &Repository, from_state_commit: Oid, to_state_commit: Oid) -> Result<()> {
    let descending = repo.walk_first_parent(to_state_commit)?;
    let from_index = descending
        .iter()
        .position(|oid| *oid == from_state_commit)
        .ok_or_else(|| {
            Error::corrupt(
                "policy history",
                "from_state_commit is not an ancestor of to_state_commit",
            )
        })?;

    let mut chain: Vec<Oid> = descending[..=from_index].to_vec();
    chain.reverse();

    for window in chain.windows(2) {
        let (prev, next) = (window[0], window[1]);
        let prev_state = PolicyState::from_tree(repo, repo.tree_of(prev)?)?;
        let prev_root = prev_state.decode_root()?;
        let next_state = PolicyState::from_tree(repo, repo.tree_of(next)?)?;
        let next_root = next_state.decode_root()?;

        let keys = prev_root
            .root_keys()
            .map_err(|e| Error::corrupt("metadata/root", e.to_string()))?
            .into_iter()
            .filter_map(|p| p.as_key().copied())
            .collect::<Vec<_>>();
        let threshold = prev_root
            .root_threshold()
            .map_err(|e| Error::corrupt("metadata/root", e.to_string()))?;

        next_state.root.verify(&keys, threshold)?;

        if next_root.is_expired_at(crate::metadata::Timestamp::now()) {
            return Err(Error::Expired("metadata/root".to_string()));
        }

        // A hop that left Root untouched (a targets-only apply) carries the
        // same Root payload forward and has nothing to check here: spec.md
        // §4.5 step 5 requires a strictly-greater version only "for every
        // file whose contents changed".
        if prev_state.root.payload != next_state.root.payload && next_root.version() <= prev_root.version() {
            return Err(Error::VersionRegression {
                location: "metadata/root".to_string(),
                found: next_root.version(),
                current: prev_root.version(),
            });
        }
    }
    Ok(())
}
