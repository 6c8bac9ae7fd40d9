//! The Persistent Cache (spec.md §4.8): a local-only index speeding up
//! repeated verification runs. Stored as a single JSON blob under
//! `refs/local/gittuf/persistent-cache`; rebuilding it from the RSL is
//! always safe since it holds no information the RSL doesn't already have.

use std::collections::BTreeMap;

use gittuf_git::{Oid, Repository, TreeEntry};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::refs::PERSISTENT_CACHE;

const CACHE_BLOB_NAME: &str = "cache.json";

/// One `(entry number, RSL entry id)` pair. [`PersistentCache::policy_entries`]
/// and [`PersistentCache::attestation_entries`] are kept sorted by `number`
/// so lookups are a binary search (spec.md §4.8 "Inserts are O(log N) via
/// binary search on entry number").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NumberedEntry {
    pub number: u64,
    pub entry_id: Oid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentCache {
    policy_entries: Vec<NumberedEntry>,
    attestation_entries: Vec<NumberedEntry>,
    added_attestations_before_number: u64,
    last_verified_entry_for_ref: BTreeMap<String, Oid>,
}

impl PersistentCache {
    pub fn load(repo: &Repository) -> Result<Self> {
        match repo.resolve_reference(*PERSISTENT_CACHE)? {
            None => Ok(Self::default()),
            Some(tip) => {
                let tree = repo.tree_of(tip)?;
                let blobs = repo.read_tree_recursive(tree)?;
                match blobs.get(std::path::Path::new(CACHE_BLOB_NAME)) {
                    None => Ok(Self::default()),
                    Some(oid) => {
                        let bytes = repo.read_blob(*oid)?;
                        Ok(serde_json::from_slice(&bytes).unwrap_or_default())
                    }
                }
            }
        }
    }

    pub fn save(&self, repo: &Repository) -> Result<Oid> {
        let parent = repo.resolve_reference(*PERSISTENT_CACHE)?;
        let bytes = serde_json::to_vec(self)?;
        let blob = repo.write_blob(&bytes)?;
        let tree = repo.write_tree(&[TreeEntry {
            name: CACHE_BLOB_NAME.to_string(),
            mode: 0o100644,
            oid: blob,
        }])?;
        let commit = repo.commit(tree, parent, "gittuf: update persistent cache", None)?;
        repo.update_ref_cas(*PERSISTENT_CACHE, parent, commit, "cache update")?;
        Ok(commit)
    }

    /// Record that `entry_id` (RSL entry `number`) applied a new policy
    /// state. Entries must be inserted in increasing `number` order, which
    /// every caller in this crate (the policy apply path) already satisfies.
    pub fn record_policy_entry(&mut self, number: u64, entry_id: Oid) {
        insert_sorted(&mut self.policy_entries, NumberedEntry { number, entry_id });
    }

    pub fn record_attestation_entry(&mut self, number: u64, entry_id: Oid) {
        insert_sorted(&mut self.attestation_entries, NumberedEntry { number, entry_id });
    }

    /// The most recent policy entry at or before `number` (spec.md §4.8
    /// "lookups for 'applicable policy at number N' return the greatest
    /// entry ≤ N").
    pub fn policy_at(&self, number: u64) -> Option<Oid> {
        greatest_at_or_before(&self.policy_entries, number)
    }

    pub fn attestations_scanned_before(&self) -> u64 {
        self.added_attestations_before_number
    }

    pub fn set_attestations_scanned_before(&mut self, number: u64) {
        self.added_attestations_before_number = self.added_attestations_before_number.max(number);
    }

    pub fn last_verified_entry_for(&self, reference: &str) -> Option<Oid> {
        self.last_verified_entry_for_ref.get(reference).copied()
    }

    pub fn set_last_verified_entry_for(&mut self, reference: &str, entry_id: Oid) {
        self.last_verified_entry_for_ref
            .insert(reference.to_string(), entry_id);
    }
}

fn insert_sorted(entries: &mut Vec<NumberedEntry>, entry: NumberedEntry) {
    match entries.binary_search_by_key(&entry.number, |e| e.number) {
        Ok(i) => entries[i] = entry,
        Err(i) => entries.insert(i, entry),
    }
}

fn greatest_at_or_before(entries: &[NumberedEntry], number: u64) -> Option<Oid> {
    match entries.binary_search_by_key(&number, |e| e.number) {
        Ok(i) => Some(entries[i].entry_id),
        Err(0) => None,
        Err(i) => Some(entries[i - 1].entry_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> Oid {
        let hex: String = std::iter::repeat(format!("{byte:02x}")).take(20).collect();
        hex.parse().unwrap()
    }

    #[test]
    fn test_policy_at_returns_greatest_at_or_before() {
        let mut cache = PersistentCache::default();
        cache.record_policy_entry(1, oid(1));
        cache.record_policy_entry(5, oid(5));
        cache.record_policy_entry(10, oid(10));

        assert_eq!(cache.policy_at(0), None);
        assert_eq!(cache.policy_at(1), Some(oid(1)));
        assert_eq!(cache.policy_at(4), Some(oid(1)));
        assert_eq!(cache.policy_at(5), Some(oid(5)));
        assert_eq!(cache.policy_at(9), Some(oid(5)));
        assert_eq!(cache.policy_at(100), Some(oid(10)));
    }

    #[test]
    fn test_save_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();

        let mut cache = PersistentCache::default();
        cache.record_policy_entry(1, oid(1));
        cache.set_last_verified_entry_for("refs/heads/main", oid(1));
        cache.save(&repo).unwrap();

        let reread = PersistentCache::load(&repo).unwrap();
        assert_eq!(reread.policy_at(1), Some(oid(1)));
        assert_eq!(
            reread.last_verified_entry_for("refs/heads/main"),
            Some(oid(1))
        );
    }

    #[test]
    fn test_out_of_order_insert_stays_sorted() {
        let mut cache = PersistentCache::default();
        cache.record_policy_entry(10, oid(10));
        cache.record_policy_entry(1, oid(1));
        assert_eq!(cache.policy_at(5), Some(oid(1)));
    }
}
