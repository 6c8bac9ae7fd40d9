use std::collections::{BTreeMap, BTreeSet};

use gittuf_crypto::{Principal, PrincipalId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::global_rules::GlobalRule;
use super::propagation::PropagationDirective;
use super::timestamp::Timestamp;
use super::MetadataBody;

/// A named role's keyset and threshold, e.g. the `"root"` or `"targets"`
/// entry of [`Root::roles`] (spec.md §3 "Root Metadata").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub key_ids: BTreeSet<PrincipalId>,
    pub threshold: usize,
}

impl Role {
    pub fn new(key_ids: impl IntoIterator<Item = PrincipalId>, threshold: usize) -> Self {
        Self {
            key_ids: key_ids.into_iter().collect(),
            threshold,
        }
    }
}

/// A trusted GitHub App integration, e.g. for merge-button approvals
/// (spec.md §3 `github_apps{name→{key_ids,threshold,trusted}}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubApp {
    pub key_ids: BTreeSet<PrincipalId>,
    pub threshold: usize,
    pub trusted: bool,
}

#[derive(Debug, Error)]
pub enum RootError {
    #[error("role '{0}' not found in root metadata")]
    MissingRole(String),
    #[error("key '{0}' referenced by a role but not present in root.keys")]
    UnknownKey(PrincipalId),
    #[error("threshold {0} for role '{1}' exceeds the role's keyset size")]
    ThresholdExceedsKeys(usize, String),
    #[error("threshold for role '{0}' is zero")]
    ZeroThreshold(String),
}

/// The trust anchor of a repository (spec.md §3 "Root Metadata"). Every
/// other piece of metadata is authorized, directly or transitively, by keys
/// this document lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Root {
    pub version: u64,
    pub expires: Timestamp,
    pub keys: BTreeMap<PrincipalId, Principal>,
    pub roles: BTreeMap<String, Role>,
    #[serde(default)]
    pub global_rules: Vec<GlobalRule>,
    #[serde(default)]
    pub propagation_directives: Vec<PropagationDirective>,
    #[serde(default)]
    pub github_apps: BTreeMap<String, GithubApp>,
}

pub const ROOT_ROLE: &str = "root";
pub const TARGETS_ROLE: &str = "targets";

impl Root {
    /// A fresh Root with a single Root key at threshold 1, the shape the
    /// bootstrap step of the policy apply protocol accepts (spec.md §4.5
    /// step 1).
    pub fn bootstrap(root_key: Principal, expires: Timestamp) -> Self {
        let id = root_key.id();
        let mut keys = BTreeMap::new();
        keys.insert(id.clone(), root_key);

        let mut roles = BTreeMap::new();
        roles.insert(ROOT_ROLE.to_string(), Role::new([id.clone()], 1));
        roles.insert(TARGETS_ROLE.to_string(), Role::new([id], 1));

        Self {
            version: 1,
            expires,
            keys,
            roles,
            global_rules: Vec::new(),
            propagation_directives: Vec::new(),
            github_apps: BTreeMap::new(),
        }
    }

    pub fn role(&self, name: &str) -> Result<&Role, RootError> {
        self.roles
            .get(name)
            .ok_or_else(|| RootError::MissingRole(name.to_string()))
    }

    /// The principals authorized for `role`, resolved from `self.keys`.
    pub fn principals_for(&self, role: &str) -> Result<Vec<&Principal>, RootError> {
        let role = self.role(role)?;
        role.key_ids
            .iter()
            .map(|id| {
                self.keys
                    .get(id)
                    .ok_or_else(|| RootError::UnknownKey(id.clone()))
            })
            .collect()
    }

    pub fn root_keys(&self) -> Result<Vec<&Principal>, RootError> {
        self.principals_for(ROOT_ROLE)
    }

    pub fn root_threshold(&self) -> Result<usize, RootError> {
        Ok(self.role(ROOT_ROLE)?.threshold)
    }

    /// Structural validation: every role's threshold is within its own
    /// keyset's bounds and every key id it names actually resolves.
    pub fn validate(&self) -> Result<(), RootError> {
        for (name, role) in &self.roles {
            if role.threshold == 0 {
                return Err(RootError::ZeroThreshold(name.clone()));
            }
            if role.threshold > role.key_ids.len() {
                return Err(RootError::ThresholdExceedsKeys(role.threshold, name.clone()));
            }
            for id in &role.key_ids {
                if !self.keys.contains_key(id) {
                    return Err(RootError::UnknownKey(id.clone()));
                }
            }
        }
        self.role(ROOT_ROLE)?;
        Ok(())
    }

    pub fn add_root_key(&mut self, key: Principal) {
        let id = key.id();
        self.keys.insert(id.clone(), key);
        self.roles
            .entry(ROOT_ROLE.to_string())
            .or_insert_with(|| Role::new([], 1))
            .key_ids
            .insert(id);
    }

    pub fn remove_root_key(&mut self, id: &PrincipalId) {
        if let Some(role) = self.roles.get_mut(ROOT_ROLE) {
            role.key_ids.remove(id);
        }
    }

    pub fn add_targets_key(&mut self, key: Principal) {
        let id = key.id();
        self.keys.insert(id.clone(), key);
        self.roles
            .entry(TARGETS_ROLE.to_string())
            .or_insert_with(|| Role::new([], 1))
            .key_ids
            .insert(id);
    }

    pub fn remove_targets_key(&mut self, id: &PrincipalId) {
        if let Some(role) = self.roles.get_mut(TARGETS_ROLE) {
            role.key_ids.remove(id);
        }
    }
}

impl MetadataBody for Root {
    fn version(&self) -> u64 {
        self.version
    }

    fn expires(&self) -> Timestamp {
        self.expires
    }
}
