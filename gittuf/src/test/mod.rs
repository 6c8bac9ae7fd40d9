//! Fixtures for the scenario and property tests in `gittuf/tests/`.

use gittuf_crypto::test::signer::MockSigner;
use gittuf_crypto::{PrincipalId, Signer};
use gittuf_git::{Oid, Repository};

use crate::metadata::{Root, Targets, Timestamp};
use crate::policy::{self, PolicyState};
use crate::refs::{POLICY, POLICY_STAGING};
use crate::rsl::Rsl;

pub fn tempdir_repo() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().expect("tempdir");
    let repo = Repository::init_bare(dir.path()).expect("init bare repo");
    (dir, repo)
}

/// A commit with no content, signed by `signer` (or unsigned if `None`),
/// parented on `parent`.
pub fn signed_commit(repo: &Repository, parent: Option<Oid>, signer: Option<&MockSigner>) -> Oid {
    let tree = repo.empty_tree().expect("empty tree");
    repo.commit(tree, parent, "test commit", signer.map(|s| s as &dyn Signer))
        .expect("create commit")
}

fn stage(repo: &Repository, state: &PolicyState, signer: &MockSigner) {
    let tree = state.to_tree(repo).expect("policy tree");
    let parent = repo.resolve_reference(*POLICY_STAGING).expect("resolve staging");
    let commit = repo
        .commit(tree, parent, "gittuf: stage policy", Some(signer))
        .expect("stage commit");
    repo.update_ref_cas(*POLICY_STAGING, parent, commit, "stage")
        .expect("update staging ref");
}

/// Bootstrap a fresh policy: Root held by `root_signer` (threshold 1), with a
/// single top-level `targets` delegation authorizing `authorized` over every
/// ref matching one of `patterns`, at `threshold`. Applies immediately and
/// returns the resulting policy commit.
pub fn bootstrap_and_apply(
    repo: &Repository,
    root_signer: &MockSigner,
    authorized: &[&MockSigner],
    patterns: &[&str],
    threshold: usize,
) -> Oid {
    let mut state = PolicyState::bootstrap(root_signer, Timestamp(u64::MAX)).expect("bootstrap");
    let mut targets = state.decode_targets("targets").expect("decode targets");
    targets
        .add_rule(crate::metadata::Rule {
            name: "default".to_string(),
            protected_namespace_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            authorized_key_ids: authorized
                .iter()
                .map(|s| PrincipalId::from(s.public_key().to_string()))
                .collect(),
            threshold,
            terminating: false,
        })
        .expect("add rule");
    state
        .set_targets("targets", &targets, root_signer)
        .expect("set targets");

    stage(repo, &state, root_signer);
    policy::apply(repo, Some(root_signer)).expect("apply policy")
}

/// Re-stage `root` with a rotated principal set, re-sign it with
/// `signing_key` (the *previous* Root key authorizing the rotation), and
/// apply. Targets are carried over unchanged.
pub fn rotate_root_and_apply(
    repo: &Repository,
    signing_key: &MockSigner,
    new_root: Root,
) -> Oid {
    let applied_tip = repo.resolve_reference(*POLICY).expect("resolve policy").expect("policy exists");
    let applied_tree = repo.tree_of(applied_tip).expect("tree of policy");
    let mut state = PolicyState::from_tree(repo, applied_tree).expect("load state");
    state.set_root(&new_root, signing_key).expect("set root");

    stage(repo, &state, signing_key);
    policy::apply(repo, Some(signing_key)).expect("apply rotated root")
}

pub fn append_reference(repo: &Repository, reference: &str, target: Oid, signer: Option<&MockSigner>) -> Oid {
    Rsl::new(repo)
        .append_reference(reference, target, signer.map(|s| s as &dyn Signer))
        .expect("append reference entry")
}

pub fn append_annotation(
    repo: &Repository,
    target_ids: Vec<Oid>,
    skip: bool,
    signer: Option<&MockSigner>,
) -> Oid {
    Rsl::new(repo)
        .append_annotation(target_ids, skip, None, signer.map(|s| s as &dyn Signer))
        .expect("append annotation entry")
}

pub fn empty_targets(expires: Timestamp) -> Targets {
    Targets::new(expires)
}

/// The `PolicyState` currently at the tip of `refs/gittuf/policy`.
pub fn current_state(repo: &Repository) -> PolicyState {
    let applied_tip = repo.resolve_reference(*POLICY).expect("resolve policy").expect("policy exists");
    let applied_tree = repo.tree_of(applied_tip).expect("tree of policy");
    PolicyState::from_tree(repo, applied_tree).expect("load state")
}

/// Add a delegation rule to the already-applied `targets` document and
/// apply. Root is left untouched, the way `Staging::add_delegation_rule`
/// (`mutate_targets`) leaves it in the public API: only the targets
/// document's version needs to strictly increase.
pub fn add_delegation_rule_and_apply(
    repo: &Repository,
    root_signer: &MockSigner,
    rule: crate::metadata::Rule,
) -> Oid {
    let mut state = current_state(repo);

    let mut targets = state.decode_targets("targets").expect("decode targets");
    targets.add_rule(rule).expect("add rule");
    targets.version += 1;
    state.set_targets("targets", &targets, root_signer).expect("set targets");

    stage(repo, &state, root_signer);
    policy::apply(repo, Some(root_signer)).expect("apply")
}

/// Add a global rule to the already-applied Root, bump its version, and
/// apply.
pub fn add_global_rule_and_apply(
    repo: &Repository,
    root_signer: &MockSigner,
    rule: crate::metadata::GlobalRule,
) -> Oid {
    let mut state = current_state(repo);
    let mut root = state.decode_root().expect("decode root");
    root.version += 1;
    root.global_rules.push(rule);
    state.set_root(&root, root_signer).expect("set root");

    stage(repo, &state, root_signer);
    policy::apply(repo, Some(root_signer)).expect("apply")
}

/// Register a trusted GitHub App integration on the already-applied Root,
/// bump its version, and apply.
pub fn add_github_app_and_apply(
    repo: &Repository,
    root_signer: &MockSigner,
    system_name: &str,
    app_signer: &MockSigner,
    threshold: usize,
) -> Oid {
    let mut state = current_state(repo);
    let mut root = state.decode_root().expect("decode root");
    root.version += 1;
    root.github_apps.insert(
        system_name.to_string(),
        crate::metadata::GithubApp {
            key_ids: [PrincipalId::from(app_signer.public_key().to_string())].into_iter().collect(),
            threshold,
            trusted: true,
        },
    );
    state.set_root(&root, root_signer).expect("set root");

    stage(repo, &state, root_signer);
    policy::apply(repo, Some(root_signer)).expect("apply")
}
