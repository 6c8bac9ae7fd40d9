use gittuf_crypto::{Envelope, Signer};
use gittuf_git::{Oid, Repository, TreeEntry};

use crate::error::{Error, Result};
use crate::refs::ATTESTATIONS;
use crate::rsl::Rsl;

use super::types::{CodeReviewApproval, ReferenceAuthorization};

/// The Attestations Store (spec.md §4.6): a single tree indexing signed
/// envelopes by (ref, fromID, toID), plus a review-id index for code review
/// approvals.
pub struct Attestations<'a> {
    repo: &'a Repository,
}

fn reference_authorization_path(reference: &str, from: Oid, to: Oid) -> String {
    format!("reference-authorizations/{reference}/{from}-{to}")
}

fn code_review_approval_path(reference: &str, from: Oid, to: Oid, system_name: &str) -> String {
    format!("code-review-approvals/{reference}/{from}-{to}/{system_name}")
}

fn code_review_index_path(review_host: &str, review_id: &str) -> String {
    format!("code-review-approvals/index/{review_host}::{review_id}")
}

impl<'a> Attestations<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    fn tip(&self) -> Result<Option<Oid>> {
        Ok(self.repo.resolve_reference(*ATTESTATIONS)?)
    }

    fn read_blob_at(&self, tree: Oid, path: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.repo.read_tree_recursive(tree)?;
        match blobs.get(std::path::Path::new(path)) {
            Some(oid) => Ok(Some(self.repo.read_blob(*oid)?)),
            None => Ok(None),
        }
    }

    /// Write a single path into the attestations tree, preserving every
    /// other existing entry (spec.md §4.6 "Updates are idempotent for
    /// identical content; conflicting content at the same index path is
    /// rejected").
    fn write_path(
        &self,
        path: &str,
        bytes: &[u8],
        signer: Option<&dyn Signer>,
    ) -> Result<Oid> {
        let parent = self.tip()?;
        let mut entries = match parent {
            Some(tip) => self.repo.read_tree_recursive(self.repo.tree_of(tip)?)?,
            None => Default::default(),
        };

        let path_buf = std::path::PathBuf::from(path);
        if let Some(existing) = entries.get(&path_buf) {
            let existing_bytes = self.repo.read_blob(*existing)?;
            if existing_bytes == bytes {
                return Ok(parent.expect("existing entry implies a tip commit"));
            }
            return Err(Error::corrupt(
                path,
                "conflicting content already recorded at this index path",
            ));
        }

        let oid = self.repo.write_blob(bytes)?;
        entries.insert(path_buf, oid);

        let tree = build_tree(self.repo, &entries)?;
        let message = format!("gittuf: attestations {path}");
        let commit = self.repo.commit(tree, parent, &message, signer)?;
        self.repo.update_ref_cas(*ATTESTATIONS, parent, commit, &message)?;
        Rsl::new(self.repo).append_reference(*ATTESTATIONS, commit, signer)?;
        Ok(commit)
    }

    pub fn set_reference_authorization(
        &self,
        subject: &ReferenceAuthorization,
        envelope: &Envelope,
        signer: Option<&dyn Signer>,
    ) -> Result<Oid> {
        validate_subject(envelope, subject)?;
        let path = reference_authorization_path(&subject.reference, subject.from_target, subject.to_target);
        let bytes = serde_json::to_vec(envelope)?;
        self.write_path(&path, &bytes, signer)
    }

    pub fn get_reference_authorization(
        &self,
        reference: &str,
        from: Oid,
        to: Oid,
    ) -> Result<Envelope> {
        let tip = self
            .tip()?
            .ok_or_else(|| Error::NotFound("attestations".to_string()))?;
        let path = reference_authorization_path(reference, from, to);
        let bytes = self
            .read_blob_at(self.repo.tree_of(tip)?, &path)?
            .ok_or_else(|| Error::NotFound(path.clone()))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::corrupt(path, e.to_string()))
    }

    pub fn set_code_review_approval(
        &self,
        subject: &CodeReviewApproval,
        envelope: &Envelope,
        signer: Option<&dyn Signer>,
    ) -> Result<Oid> {
        validate_review_subject(envelope, subject)?;
        let path = code_review_approval_path(
            &subject.reference,
            subject.from_target,
            subject.to_target,
            &subject.system_name,
        );
        let bytes = serde_json::to_vec(envelope)?;
        self.write_path(&path, &bytes, signer)?;

        let index_path = code_review_index_path(&subject.review_host, &subject.review_id);
        self.write_path(&index_path, path.as_bytes(), signer)
    }

    pub fn get_code_review_approval(
        &self,
        reference: &str,
        from: Oid,
        to: Oid,
        system_name: &str,
    ) -> Result<Envelope> {
        let tip = self
            .tip()?
            .ok_or_else(|| Error::NotFound("attestations".to_string()))?;
        let path = code_review_approval_path(reference, from, to, system_name);
        let bytes = self
            .read_blob_at(self.repo.tree_of(tip)?, &path)?
            .ok_or_else(|| Error::NotFound(path.clone()))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::corrupt(path, e.to_string()))
    }

    pub fn get_code_review_approval_by_review_id(
        &self,
        review_host: &str,
        review_id: &str,
    ) -> Result<Envelope> {
        let tip = self
            .tip()?
            .ok_or_else(|| Error::NotFound("attestations".to_string()))?;
        let index_path = code_review_index_path(review_host, review_id);
        let pointer = self
            .read_blob_at(self.repo.tree_of(tip)?, &index_path)?
            .ok_or_else(|| Error::NotFound(index_path.clone()))?;
        let path = String::from_utf8(pointer)
            .map_err(|_| Error::corrupt(index_path, "index pointer is not utf-8"))?;
        let bytes = self
            .read_blob_at(self.repo.tree_of(tip)?, &path)?
            .ok_or_else(|| Error::NotFound(path.clone()))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::corrupt(path, e.to_string()))
    }
}

fn validate_subject(envelope: &Envelope, subject: &ReferenceAuthorization) -> Result<()> {
    let decoded: ReferenceAuthorization =
        serde_json::from_slice(&envelope.payload).map_err(|e| Error::corrupt("attestation payload", e.to_string()))?;
    if decoded != *subject {
        return Err(Error::corrupt(
            "attestation payload",
            "envelope subject does not match (ref, fromID, toID)",
        ));
    }
    Ok(())
}

fn validate_review_subject(envelope: &Envelope, subject: &CodeReviewApproval) -> Result<()> {
    let decoded: CodeReviewApproval =
        serde_json::from_slice(&envelope.payload).map_err(|e| Error::corrupt("attestation payload", e.to_string()))?;
    if decoded != *subject {
        return Err(Error::corrupt(
            "attestation payload",
            "envelope subject does not match (ref, fromID, toID, system)",
        ));
    }
    Ok(())
}

fn build_tree(repo: &Repository, entries: &std::collections::BTreeMap<std::path::PathBuf, Oid>) -> Result<Oid> {
    // Group blobs by their immediate parent directory and nest bottom-up, since
    // `Repository::write_tree` only builds a single flat level at a time.
    use std::collections::BTreeMap as Map;

    fn insert_into(
        node: &mut Map<String, Node>,
        components: &[std::ffi::OsString],
        oid: Oid,
    ) {
        match components.split_first() {
            None => {}
            Some((head, [])) => {
                node.insert(head.to_string_lossy().to_string(), Node::Blob(oid));
            }
            Some((head, rest)) => {
                let entry = node
                    .entry(head.to_string_lossy().to_string())
                    .or_insert_with(|| Node::Tree(Map::new()));
                if let Node::Tree(children) = entry {
                    insert_into(children, rest, oid);
                }
            }
        }
    }

    enum Node {
        Blob(Oid),
        Tree(Map<String, Node>),
    }

    fn write_node(repo: &Repository, node: Map<String, Node>) -> Result<Oid> {
        let mut entries = Vec::new();
        for (name, child) in node {
            match child {
                Node::Blob(oid) => entries.push(TreeEntry { name, mode: 0o100644, oid }),
                Node::Tree(children) => {
                    let oid = write_node(repo, children)?;
                    entries.push(TreeEntry { name, mode: 0o040000, oid });
                }
            }
        }
        repo.write_tree(&entries).map_err(Into::into)
    }

    let mut root: Map<String, Node> = Map::new();
    for (path, oid) in entries {
        let components: Vec<std::ffi::OsString> = path.components().map(|c| c.as_os_str().to_owned()).collect();
        insert_into(&mut root, &components, *oid);
    }
    write_node(repo, root)
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

    fn oid(byte: u8) -> Oid {
        let hex: String = std::iter::repeat(format!("{byte:02x}")).take(20).collect();
        hex.parse().unwrap()
    }

    #[test]
    fn test_set_and_get_reference_authorization() {
        let (_dir, repo) = tempdir_repo();
        let signer = MockSigner::from_seed([1; 32]);
        let store = Attestations::new(&repo);

        let subject = ReferenceAuthorization {
            reference: "refs/heads/main".to_string(),
            from_target: oid(1),
            to_target: oid(2),
        };
        let bytes = serde_json::to_vec(&subject).unwrap();
        let mut envelope = Envelope::wrap(super::super::types::PREDICATE_REFERENCE_AUTHORIZATION, bytes);
        envelope.sign(&signer).unwrap();

        store
            .set_reference_authorization(&subject, &envelope, Some(&signer))
            .unwrap();

        let fetched = store
            .get_reference_authorization("refs/heads/main", oid(1), oid(2))
            .unwrap();
        assert_eq!(fetched.payload, envelope.payload);
    }

    #[test]
    fn test_conflicting_content_rejected() {
        let (_dir, repo) = tempdir_repo();
        let signer = MockSigner::from_seed([1; 32]);
        let store = Attestations::new(&repo);

        let subject = ReferenceAuthorization {
            reference: "refs/heads/main".to_string(),
            from_target: oid(1),
            to_target: oid(2),
        };
        let mut envelope_a = Envelope::wrap(
            super::super::types::PREDICATE_REFERENCE_AUTHORIZATION,
            serde_json::to_vec(&subject).unwrap(),
        );
        envelope_a.sign(&signer).unwrap();
        store
            .set_reference_authorization(&subject, &envelope_a, Some(&signer))
            .unwrap();

        let mut envelope_b = envelope_a.clone();
        let other = MockSigner::from_seed([2; 32]);
        envelope_b.sign(&other).unwrap();
        let err = store
            .set_reference_authorization(&subject, &envelope_b, Some(&signer))
            .unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_lookup_code_review_approval_by_review_id() {
        let (_dir, repo) = tempdir_repo();
        let signer = MockSigner::from_seed([1; 32]);
        let store = Attestations::new(&repo);

        let subject = CodeReviewApproval {
            reference: "refs/heads/main".to_string(),
            from_target: oid(1),
            to_target: oid(2),
            system_name: "github".to_string(),
            review_host: "github.com".to_string(),
            review_id: "42".to_string(),
            approver: gittuf_crypto::PrincipalId::from("alice"),
        };
        let mut envelope = Envelope::wrap(
            super::super::types::PREDICATE_CODE_REVIEW_APPROVAL,
            serde_json::to_vec(&subject).unwrap(),
        );
        envelope.sign(&signer).unwrap();

        store
            .set_code_review_approval(&subject, &envelope, Some(&signer))
            .unwrap();

        let fetched = store
            .get_code_review_approval_by_review_id("github.com", "42")
            .unwrap();
        assert_eq!(fetched.payload, envelope.payload);
    }
}
