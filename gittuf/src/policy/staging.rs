use gittuf_crypto::{Principal, PrincipalId, Signer};
use gittuf_git::{Oid, Repository};

use crate::error::Result;
use crate::metadata::{GlobalRule, PropagationDirective, Root, Rule, Targets, Timestamp};
use crate::refs::POLICY_STAGING;

use super::state::PolicyState;

/// A handle over `policy-staging`, applying one mutation at a time the way
/// spec.md §4.5 describes the staging operations: "Each such operation loads
/// the current staged Root/Targets, mutates them, re-signs with the
/// caller's signer, and writes back."
pub struct Staging<'a, S: Signer> {
    repo: &'a Repository,
    signer: &'a S,
}

impl<'a, S: Signer> Staging<'a, S> {
    pub fn new(repo: &'a Repository, signer: &'a S) -> Self {
        Self { repo, signer }
    }

    fn load(&self) -> Result<(Option<Oid>, PolicyState)> {
        match self.repo.resolve_reference(*POLICY_STAGING)? {
            Some(tip) => {
                let tree = self.repo.tree_of(tip)?;
                Ok((Some(tip), PolicyState::from_tree(self.repo, tree)?))
            }
            None => Ok((None, PolicyState::bootstrap(self.signer, Timestamp::now())?)),
        }
    }

    fn write_back(&self, parent: Option<Oid>, state: &PolicyState, message: &str) -> Result<Oid> {
        let tree = state.to_tree(self.repo)?;
        let commit = self.repo.commit(tree, parent, message, Some(self.signer))?;
        self.repo
            .update_ref_cas(*POLICY_STAGING, parent, commit, message)?;
        Ok(commit)
    }

    /// Initialize staging with a fresh bootstrap Root, if none exists yet.
    pub fn init(&self, expires: Timestamp) -> Result<Oid> {
        let (parent, _) = self.load()?;
        let state = PolicyState::bootstrap(self.signer, expires)?;
        self.write_back(parent, &state, "gittuf: init policy")
    }

    pub fn mutate_root(&self, message: &str, f: impl FnOnce(&mut Root)) -> Result<Oid> {
        let (parent, mut staged) = self.load()?;
        let mut root = staged.decode_root()?;
        f(&mut root);
        root.version += 1;
        staged.set_root(&root, self.signer)?;
        self.write_back(parent, &staged, message)
    }

    pub fn mutate_targets(
        &self,
        name: &str,
        message: &str,
        f: impl FnOnce(&mut Targets),
    ) -> Result<Oid> {
        let (parent, mut staged) = self.load()?;
        let mut targets = staged
            .decode_targets(name)
            .unwrap_or_else(|_| Targets::new(Timestamp::now()));
        f(&mut targets);
        targets.version += 1;
        staged.set_targets(name, &targets, self.signer)?;
        self.write_back(parent, &staged, message)
    }

    pub fn add_root_key(&self, key: Principal) -> Result<Oid> {
        self.mutate_root("gittuf: add root key", |root| root.add_root_key(key))
    }

    pub fn remove_root_key(&self, id: &PrincipalId) -> Result<Oid> {
        let id = id.clone();
        self.mutate_root("gittuf: remove root key", |root| root.remove_root_key(&id))
    }

    pub fn add_targets_key(&self, key: Principal) -> Result<Oid> {
        self.mutate_root("gittuf: add targets key", |root| root.add_targets_key(key))
    }

    pub fn remove_targets_key(&self, id: &PrincipalId) -> Result<Oid> {
        let id = id.clone();
        self.mutate_root("gittuf: remove targets key", |root| root.remove_targets_key(&id))
    }

    pub fn add_delegation_rule(&self, document: &str, rule: Rule) -> Result<Oid> {
        self.mutate_targets(document, "gittuf: add delegation rule", |targets| {
            targets.delegations.push(rule);
        })
    }

    pub fn remove_delegation_rule(&self, document: &str, name: &str) -> Result<Oid> {
        let name = name.to_string();
        self.mutate_targets(document, "gittuf: remove delegation rule", |targets| {
            targets.remove_rule(&name);
        })
    }

    /// Reorder delegation rules in `document` by applying `order` (indices
    /// into the current rule list, the new sequence).
    pub fn reorder_delegation_rules(&self, document: &str, order: Vec<usize>) -> Result<Oid> {
        self.mutate_targets(document, "gittuf: reorder delegation rules", |targets| {
            let original = std::mem::take(&mut targets.delegations);
            targets.delegations = order
                .into_iter()
                .filter_map(|i| original.get(i).cloned())
                .collect();
        })
    }

    pub fn add_global_rule(&self, rule: GlobalRule) -> Result<Oid> {
        self.mutate_root("gittuf: add global rule", |root| root.global_rules.push(rule))
    }

    pub fn remove_global_rule(&self, index: usize) -> Result<Oid> {
        self.mutate_root("gittuf: remove global rule", |root| {
            if index < root.global_rules.len() {
                root.global_rules.remove(index);
            }
        })
    }

    pub fn update_global_rule(&self, index: usize, rule: GlobalRule) -> Result<Oid> {
        self.mutate_root("gittuf: update global rule", |root| {
            if let Some(slot) = root.global_rules.get_mut(index) {
                *slot = rule;
            }
        })
    }

    pub fn add_propagation_directive(&self, directive: PropagationDirective) -> Result<Oid> {
        self.mutate_root("gittuf: add propagation directive", |root| {
            root.propagation_directives.push(directive)
        })
    }

    pub fn remove_propagation_directive(&self, name: &str) -> Result<Oid> {
        let name = name.to_string();
        self.mutate_root("gittuf: remove propagation directive", |root| {
            root.propagation_directives.retain(|d| d.name != name);
        })
    }

    /// Add an additional signature to an already-staged document, without
    /// mutating its content or bumping its version.
    pub fn countersign(&self, document: &str) -> Result<Oid> {
        let (parent, mut staged) = self.load()?;
        staged.countersign(document, self.signer)?;
        self.write_back(parent, &staged, "gittuf: countersign")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gittuf_crypto::test::signer::MockSigner;

    fn tempdir_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_init_then_add_delegation_rule() {
        let (_dir, repo) = tempdir_repo();
        let signer = MockSigner::from_seed([1; 32]);
        let staging = Staging::new(&repo, &signer);

        staging.init(Timestamp(u64::MAX)).unwrap();
        staging
            .add_delegation_rule(
                "targets",
                Rule {
                    name: "releases".to_string(),
                    protected_namespace_patterns: vec!["refs/heads/release/*".to_string()],
                    authorized_key_ids: vec![PrincipalId::from("k")],
                    threshold: 1,
                    terminating: false,
                },
            )
            .unwrap();

        let tip = repo.resolve_reference(*POLICY_STAGING).unwrap().unwrap();
        let state = PolicyState::from_tree(&repo, repo.tree_of(tip).unwrap()).unwrap();
        let targets = state.decode_targets("targets").unwrap();
        assert_eq!(targets.delegations.len(), 1);
        assert_eq!(targets.version, 2);
    }

    #[test]
    fn test_add_root_key_bumps_root_version() {
        let (_dir, repo) = tempdir_repo();
        let signer = MockSigner::from_seed([1; 32]);
        let staging = Staging::new(&repo, &signer);
        staging.init(Timestamp(u64::MAX)).unwrap();

        let other = MockSigner::from_seed([2; 32]);
        staging.add_root_key(Principal::Key(*other.public_key())).unwrap();

        let tip = repo.resolve_reference(*POLICY_STAGING).unwrap().unwrap();
        let state = PolicyState::from_tree(&repo, repo.tree_of(tip).unwrap()).unwrap();
        let root = state.decode_root().unwrap();
        assert_eq!(root.version, 2);
        assert_eq!(root.keys.len(), 2);
    }
}
