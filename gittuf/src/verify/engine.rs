use std::collections::BTreeSet;

use gittuf_crypto::PrincipalId;
use gittuf_git::{Oid, Repository};

use crate::attestations::Attestations;
use crate::cache::PersistentCache;
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::metadata::{MetadataBody, Timestamp};
use crate::policy::{self, PolicyState};
use crate::refs::POLICY;
use crate::rsl::{Entry, Rsl};

/// Why a single RSL entry failed to verify (spec.md §4.7 step 4: "return the
/// failing entry, the rule that failed, and the missing/invalid
/// principal(s)").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    pub entry_number: u64,
    pub rule: String,
    pub missing_or_invalid: Vec<PrincipalId>,
}

impl std::fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "entry {} failed rule '{}': missing/invalid principals {:?}",
            self.entry_number, self.rule, self.missing_or_invalid
        )
    }
}

/// The Verification Engine (spec.md §4.7). Walks the RSL for a single
/// reference, resolving the applicable policy at each entry and checking
/// delegation thresholds, global rules, and skip/rollback semantics.
pub struct Engine<'a> {
    repo: &'a Repository,
    cancel: CancellationToken,
}

impl<'a> Engine<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(repo: &'a Repository, cancel: CancellationToken) -> Self {
        Self { repo, cancel }
    }

    /// Verify `reference`'s full recorded history (or the slice since the
    /// persistent cache's watermark), returning the last accepted target.
    pub fn verify_reference(&self, reference: &str) -> std::result::Result<Oid, VerificationFailure> {
        self.verify_reference_inner(reference)
            .unwrap_or_else(|e| Err(engine_error_to_failure(e)))
    }

    fn verify_reference_inner(&self, reference: &str) -> Result<std::result::Result<Oid, VerificationFailure>> {
        self.cancel.check()?;
        let rsl = Rsl::new(self.repo);
        let (tip_id, _tip_entry) = rsl.latest()?;

        let mut cache = PersistentCache::load(self.repo)?;
        let watermark = cache
            .last_verified_entry_for(reference)
            .filter(|w| self.repo.is_ancestor(*w, tip_id).unwrap_or(false));

        let skip_set = self.skip_set(&rsl)?;

        let mut history = rsl.history_for(reference, watermark)?;
        history.reverse(); // oldest first

        let mut accepted_target: Option<Oid> = watermark.and_then(|w| {
            history
                .iter()
                .find(|(id, _)| *id == w)
                .and_then(|(_, e)| e.target_id())
        });
        // Whether the most recently processed *unskipped* entry was itself
        // accepted. A skip erases its entry from consideration entirely (the
        // flag is left untouched), so this tracks "is the ref's current tip
        // backed by a valid chain", not merely "was some earlier state valid"
        // (spec.md §4.7 step f: skipped or failed entries roll back to the
        // last-accepted target, but a failing *tip* entry must still fail
        // verification of the ref as a whole).
        let mut tip_is_accepted = watermark.is_some();
        let mut last_failure: Option<VerificationFailure> = None;
        let mut last_validated_policy: Option<Oid> = None;

        for (entry_id, entry) in &history {
            self.cancel.check()?;
            if Some(*entry_id) == watermark {
                continue;
            }
            let Some(new_target) = entry.target_id() else {
                continue;
            };
            if skip_set.contains(entry_id) {
                continue;
            }

            let policy_entry_id = cache
                .policy_at(entry.number())
                .or_else(|| self.fallback_policy_lookup(&rsl, entry.number(), &mut cache).ok().flatten());
            let Some(policy_entry_id) = policy_entry_id else {
                last_failure = Some(VerificationFailure {
                    entry_number: entry.number(),
                    rule: "policy-resolution".to_string(),
                    missing_or_invalid: Vec::new(),
                });
                tip_is_accepted = false;
                continue;
            };
            let policy_commit = match self.policy_commit_of(policy_entry_id) {
                Ok(c) => c,
                Err(_) => {
                    last_failure = Some(VerificationFailure {
                        entry_number: entry.number(),
                        rule: "policy-resolution".to_string(),
                        missing_or_invalid: Vec::new(),
                    });
                    tip_is_accepted = false;
                    continue;
                }
            };

            if let Err(e) = self.ensure_policy_valid(policy_commit, &mut last_validated_policy) {
                last_failure = Some(VerificationFailure {
                    entry_number: entry.number(),
                    rule: format!("policy-transition: {e}"),
                    missing_or_invalid: Vec::new(),
                });
                tip_is_accepted = false;
                continue;
            }

            let state = PolicyState::from_tree(self.repo, self.repo.tree_of(policy_commit)?)?;
            let root = state.decode_root()?;
            let authorization = policy::resolve(&state, reference)?;

            let accepted = self.gather_accepted_principals(
                &root,
                reference,
                accepted_target,
                new_target,
                &authorization.key_ids,
            )?;

            let global_minimums = policy::delegation::global_thresholds(&root, reference);
            let required = global_minimums
                .into_iter()
                .fold(authorization.threshold, usize::max);

            if authorization.threshold == 0 && required == 0 {
                last_failure = Some(VerificationFailure {
                    entry_number: entry.number(),
                    rule: "no-delegation".to_string(),
                    missing_or_invalid: Vec::new(),
                });
                tip_is_accepted = false;
                continue;
            }

            if accepted.len() < required {
                let missing = authorization.key_ids.difference(&accepted).cloned().collect();
                last_failure = Some(VerificationFailure {
                    entry_number: entry.number(),
                    rule: "threshold".to_string(),
                    missing_or_invalid: missing,
                });
                tip_is_accepted = false;
                continue;
            }

            if policy::delegation::force_pushes_blocked(&root, reference) {
                if let Some(prev) = accepted_target {
                    let prev_commit = self.commit_equivalent(prev)?;
                    let new_commit = self.commit_equivalent(new_target)?;
                    if !self.repo.is_ancestor(prev_commit, new_commit)? {
                        last_failure = Some(VerificationFailure {
                            entry_number: entry.number(),
                            rule: "block-force-pushes".to_string(),
                            missing_or_invalid: Vec::new(),
                        });
                        tip_is_accepted = false;
                        continue;
                    }
                }
            }

            accepted_target = Some(new_target);
            tip_is_accepted = true;
        }

        match (tip_is_accepted, accepted_target) {
            (true, Some(target)) => {
                cache.set_last_verified_entry_for(reference, tip_id);
                cache.save(self.repo)?;
                Ok(Ok(target))
            }
            _ => Ok(Err(last_failure.unwrap_or(VerificationFailure {
                entry_number: 0,
                rule: "no-history".to_string(),
                missing_or_invalid: Vec::new(),
            }))),
        }
    }

    fn skip_set(&self, rsl: &Rsl) -> Result<BTreeSet<Oid>> {
        let mut skipped = BTreeSet::new();
        for (_, annotation) in rsl.annotations()? {
            if annotation.skip {
                skipped.extend(annotation.target_ids);
            }
        }
        Ok(skipped)
    }

    /// Resolve an RSL entry number to the RSL entry id that last applied a
    /// policy state at or before that number, by walking the
    /// reference-state-log's `policy` history directly. Used when the cache
    /// has not yet indexed an entry this old; the result is cached for next
    /// time.
    fn fallback_policy_lookup(
        &self,
        rsl: &Rsl,
        number: u64,
        cache: &mut PersistentCache,
    ) -> Result<Option<Oid>> {
        let policy_history = rsl.history_for(*POLICY, None)?;
        for (entry_id, entry) in &policy_history {
            if entry.number() <= number {
                cache.record_policy_entry(entry.number(), *entry_id);
                return Ok(Some(*entry_id));
            }
        }
        Ok(None)
    }

    fn policy_commit_of(&self, rsl_entry_id: Oid) -> Result<Oid> {
        let message = self.repo.message_of(rsl_entry_id)?;
        let entry = Entry::decode(&message)?;
        entry
            .target_id()
            .ok_or_else(|| Error::corrupt("rsl entry", "policy entry has no target"))
    }

    /// Re-verify the transition into `policy_commit` if it has not already
    /// been checked this pass (spec.md §4.7 step a: "Verify Pᵢ against its
    /// predecessor (once per verification pass, memoized)").
    fn ensure_policy_valid(&self, policy_commit: Oid, last_validated: &mut Option<Oid>) -> Result<()> {
        if *last_validated == Some(policy_commit) {
            return Ok(());
        }
        match *last_validated {
            Some(last) if self.repo.is_ancestor(last, policy_commit)? => {
                policy::history::verify_trusted_states(self.repo, last, policy_commit)?;
            }
            _ => {
                let genesis = self.genesis_of(policy_commit)?;
                let genesis_state = PolicyState::from_tree(self.repo, self.repo.tree_of(genesis)?)?;
                let genesis_root = genesis_state.decode_root()?;
                policy::bootstrap_verify(&genesis_state, &genesis_root)?;
                if genesis != policy_commit {
                    policy::history::verify_trusted_states(self.repo, genesis, policy_commit)?;
                }
            }
        }

        // spec.md §4.3: "Verification of a piece of metadata consults both:
        // an expired envelope is rejected." `verify_trusted_states` and
        // `bootstrap_verify` already reject an expired Root along the
        // chain; the Targets documents actually in effect at `policy_commit`
        // still need the same check here.
        let state = PolicyState::from_tree(self.repo, self.repo.tree_of(policy_commit)?)?;
        let root = state.decode_root()?;
        let now = Timestamp::now();
        if root.is_expired_at(now) {
            return Err(Error::Expired("metadata/root".to_string()));
        }
        for name in state.targets.keys() {
            if state.decode_targets(name)?.is_expired_at(now) {
                return Err(Error::Expired(format!("metadata/{name}")));
            }
        }

        *last_validated = Some(policy_commit);
        Ok(())
    }

    /// The commit a ref tip refers to: `oid` itself for a branch tip, or the
    /// tag's target for an annotated tag tip (spec.md §4.7, tag verification
    /// is analogous to commit verification but reasons about the underlying
    /// commit for history/ancestry purposes).
    fn commit_equivalent(&self, oid: Oid) -> Result<Oid> {
        if self.repo.kind_of(oid)? == gittuf_git::ObjectKind::Tag {
            Ok(self.repo.tag_target(oid)?)
        } else {
            Ok(oid)
        }
    }

    fn genesis_of(&self, policy_commit: Oid) -> Result<Oid> {
        let chain = self.repo.walk_first_parent(policy_commit)?;
        chain
            .last()
            .copied()
            .ok_or_else(|| Error::corrupt("policy history", "empty policy chain"))
    }

    /// Gather the set of distinct accepted principal ids authorizing the
    /// change from `prev` to `new_target` on `reference`: the Git object
    /// signature on `new_target`, any reference authorization keyed by
    /// `(reference, prev, new_target)`, and any code review approval issued
    /// by a trusted `root.github_apps` integration (spec.md §4.7 step c-d).
    ///
    /// When `new_target` is an annotated tag object, the object signature is
    /// checked with [`gittuf_git::Repository::verify_tag_signature`] rather
    /// than the commit path, and attestation lookups are keyed by the tag's
    /// own target commit rather than the tag object itself (spec.md §4.7
    /// "Tag verification is analogous, using the tag object's signature and
    /// the authorizations keyed by the tag's target").
    fn gather_accepted_principals(
        &self,
        root: &crate::metadata::Root,
        reference: &str,
        prev: Option<Oid>,
        new_target: Oid,
        candidates: &BTreeSet<PrincipalId>,
    ) -> Result<BTreeSet<PrincipalId>> {
        let mut accepted = BTreeSet::new();
        let candidate_keys: Vec<(PrincipalId, gittuf_crypto::PublicKey)> = candidates
            .iter()
            .filter_map(|id| id.to_string().parse::<gittuf_crypto::PublicKey>().ok().map(|k| (id.clone(), k)))
            .collect();

        let is_tag = self.repo.kind_of(new_target)? == gittuf_git::ObjectKind::Tag;
        for (id, key) in &candidate_keys {
            let ok = if is_tag {
                self.repo
                    .verify_tag_signature(new_target, |msg, sig| key.verify(msg, sig).is_ok())
                    .unwrap_or(false)
            } else {
                self.repo
                    .verify_commit_signature(new_target, |msg, sig| key.verify(msg, sig).is_ok())
                    .unwrap_or(false)
            };
            if ok {
                accepted.insert(id.clone());
            }
        }

        // Attestations for a tag update are recorded against the commit the
        // tag points to, since that is the subject reviewers actually
        // authorized.
        let attestation_target = if is_tag { self.repo.tag_target(new_target)? } else { new_target };
        let prev = match prev {
            Some(p) => self.commit_equivalent(p)?,
            None => zero_like(attestation_target),
        };
        let attestations = Attestations::new(self.repo);
        if let Ok(envelope) = attestations.get_reference_authorization(reference, prev, attestation_target) {
            for (id, key) in &candidate_keys {
                if envelope.verify(&[*key], 1).is_ok() {
                    accepted.insert(id.clone());
                }
            }
        }

        for (system_name, app) in &root.github_apps {
            if !app.trusted {
                continue;
            }
            let Ok(envelope) = attestations.get_code_review_approval(reference, prev, attestation_target, system_name) else {
                continue;
            };
            let app_keys: Vec<gittuf_crypto::PublicKey> = app
                .key_ids
                .iter()
                .filter_map(|id| id.to_string().parse().ok())
                .collect();
            if envelope.verify(&app_keys, app.threshold).is_err() {
                continue;
            }
            let Ok(approval) = serde_json::from_slice::<crate::attestations::CodeReviewApproval>(&envelope.payload)
            else {
                continue;
            };
            if candidates.contains(&approval.approver) {
                accepted.insert(approval.approver);
            }
        }

        Ok(accepted)
    }
}

fn zero_like(oid: Oid) -> Oid {
    oid.zero()
}

fn engine_error_to_failure(e: Error) -> VerificationFailure {
    VerificationFailure {
        entry_number: 0,
        rule: "internal-error".to_string(),
        missing_or_invalid: Vec::new(),
    }
    .with_reason(e)
}

impl VerificationFailure {
    fn with_reason(mut self, e: Error) -> Self {
        self.rule = format!("internal-error: {e}");
        self
    }
}
