use std::collections::BTreeMap;

use gittuf_crypto::canonical;
use gittuf_crypto::{Envelope, PrincipalId, Signer};
use gittuf_git::{Oid, Repository, TreeEntry};

use crate::error::{Error, Result};
use crate::metadata::{Root, Targets, TARGETS_ROLE};

/// The envelope payload type for every metadata document (spec.md §6
/// "Envelope payload type identifiers").
pub const METADATA_PAYLOAD_TYPE: &str = "application/vnd.gittuf+json";

const KEYS_PREFIX: &str = "keys/";
const METADATA_PREFIX: &str = "metadata/";
const ROOT_PATH: &str = "metadata/root";
const TARGETS_PATH: &str = "metadata/targets";

/// In-memory view of a policy commit's tree (spec.md §4.5 "Tree layout of a
/// policy commit"). `targets` is keyed by document name: `"targets"` for the
/// top-level document, or a delegated name for `/metadata/<delegated>`.
#[derive(Debug, Clone)]
pub struct PolicyState {
    pub root: Envelope,
    pub targets: BTreeMap<String, Envelope>,
}

impl PolicyState {
    /// A freshly bootstrapped state: a signed Root naming `signer` as the
    /// sole root key at threshold 1, and an empty top-level Targets document
    /// signed by the same key (spec.md §4.5 "initialize: write an initial
    /// Root with the caller's key at threshold 1").
    pub fn bootstrap<S: Signer>(signer: &S, expires: crate::metadata::Timestamp) -> Result<Self> {
        let root = Root::bootstrap((*signer.public_key()).into(), expires);
        let root_envelope = sign_payload(&root, signer)?;

        let targets = Targets::new(expires);
        let targets_envelope = sign_payload(&targets, signer)?;

        let mut map = BTreeMap::new();
        map.insert(TARGETS_ROLE.to_string(), targets_envelope);

        Ok(Self {
            root: root_envelope,
            targets: map,
        })
    }

    pub fn decode_root(&self) -> Result<Root> {
        serde_json::from_slice(&self.root.payload)
            .map_err(|e| Error::corrupt("metadata/root", e.to_string()))
    }

    pub fn decode_targets(&self, name: &str) -> Result<Targets> {
        let envelope = self
            .targets
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("metadata/{name}")))?;
        serde_json::from_slice(&envelope.payload)
            .map_err(|e| Error::corrupt(format!("metadata/{name}"), e.to_string()))
    }

    pub fn set_root<S: Signer>(&mut self, root: &Root, signer: &S) -> Result<()> {
        self.root = sign_payload(root, signer)?;
        Ok(())
    }

    pub fn set_targets<S: Signer>(&mut self, name: &str, targets: &Targets, signer: &S) -> Result<()> {
        self.targets.insert(name.to_string(), sign_payload(targets, signer)?);
        Ok(())
    }

    pub fn countersign<S: Signer>(&mut self, document: &str, signer: &S) -> Result<()> {
        let envelope = if document == ROOT_DOC {
            &mut self.root
        } else {
            self.targets
                .get_mut(document)
                .ok_or_else(|| Error::NotFound(format!("metadata/{document}")))?
        };
        envelope.sign(signer).map_err(Into::into)
    }

    /// Read a policy commit's tree into memory (spec.md §4.5 tree layout).
    pub fn from_tree(repo: &Repository, tree: Oid) -> Result<Self> {
        let blobs = repo.read_tree_recursive(tree)?;
        let mut root = None;
        let mut targets = BTreeMap::new();

        for (path, oid) in blobs {
            let path = path.to_string_lossy().replace('\\', "/");
            if path == ROOT_PATH {
                let bytes = repo.read_blob(oid)?;
                root = Some(decode_envelope("metadata/root", &bytes)?);
            } else if let Some(name) = path.strip_prefix(METADATA_PREFIX) {
                let bytes = repo.read_blob(oid)?;
                targets.insert(name.to_string(), decode_envelope(&path, &bytes)?);
            }
        }

        let root = root.ok_or_else(|| Error::NotFound("metadata/root".to_string()))?;
        Ok(Self { root, targets })
    }

    /// Write this state's tree layout to the object store, including the
    /// raw principal blobs under `/keys/<principal_id>` (spec.md §4.5).
    pub fn to_tree(&self, repo: &Repository) -> Result<Oid> {
        let root_doc = self.decode_root()?;
        let mut entries = Vec::new();

        entries.push(blob_entry(repo, "root", &self.root)?);
        for (name, envelope) in &self.targets {
            entries.push(blob_entry(repo, name, envelope)?);
        }
        let metadata_tree = nest(repo, entries)?;

        let mut key_entries = Vec::new();
        for (id, principal) in &root_doc.keys {
            let bytes = canonical::to_vec(principal)?;
            let oid = repo.write_blob(&bytes)?;
            key_entries.push(TreeEntry {
                name: sanitize(id),
                mode: 0o100644,
                oid,
            });
        }
        let keys_tree = repo.write_tree(&key_entries)?;

        repo.write_tree(&[
            TreeEntry {
                name: "metadata".to_string(),
                mode: 0o040000,
                oid: metadata_tree,
            },
            TreeEntry {
                name: "keys".to_string(),
                mode: 0o040000,
                oid: keys_tree,
            },
        ])
        .map_err(Into::into)
    }
}

const ROOT_DOC: &str = "root";

fn sign_payload<T: serde::Serialize, S: Signer>(value: &T, signer: &S) -> Result<Envelope> {
    let bytes = canonical::to_vec(value)?;
    let mut envelope = Envelope::wrap(METADATA_PAYLOAD_TYPE, bytes);
    envelope.sign(signer)?;
    Ok(envelope)
}

fn decode_envelope(location: &str, bytes: &[u8]) -> Result<Envelope> {
    serde_json::from_slice(bytes).map_err(|e| Error::corrupt(location, e.to_string()))
}

fn blob_entry(repo: &Repository, name: &str, envelope: &Envelope) -> Result<(String, Oid)> {
    let bytes = serde_json::to_vec(envelope)?;
    let oid = repo.write_blob(&bytes)?;
    Ok((name.to_string(), oid))
}

fn nest(repo: &Repository, entries: Vec<(String, Oid)>) -> Result<Oid> {
    let entries: Vec<TreeEntry> = entries
        .into_iter()
        .map(|(name, oid)| TreeEntry {
            name,
            mode: 0o100644,
            oid,
        })
        .collect();
    repo.write_tree(&entries).map_err(Into::into)
}

fn sanitize(id: &PrincipalId) -> String {
    id.to_string().replace(['/', ':'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gittuf_crypto::test::signer::MockSigner;
    use crate::metadata::Timestamp;

    fn tempdir_repo() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init_bare(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_bootstrap_round_trips_through_tree() {
        let (_dir, repo) = tempdir_repo();
        let signer = MockSigner::from_seed([1; 32]);
        let state = PolicyState::bootstrap(&signer, Timestamp(u64::MAX)).unwrap();

        let tree = state.to_tree(&repo).unwrap();
        let reread = PolicyState::from_tree(&repo, tree).unwrap();

        assert_eq!(state.decode_root().unwrap(), reread.decode_root().unwrap());
        assert_eq!(
            state.decode_targets("targets").unwrap(),
            reread.decode_targets("targets").unwrap()
        );
    }

    #[test]
    fn test_countersign_adds_second_signature() {
        let signer_a = MockSigner::from_seed([1; 32]);
        let signer_b = MockSigner::from_seed([2; 32]);
        let mut state = PolicyState::bootstrap(&signer_a, Timestamp(u64::MAX)).unwrap();
        state.countersign("root", &signer_b).unwrap();
        assert_eq!(state.root.signatures.len(), 2);
    }
}
