use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gittuf_crypto::{Signature, Signer};
use log::debug;

use crate::error::{is_not_found_err, Error};
use crate::oid::Oid;

/// A single entry written into a tree via [`Repository::write_tree`].
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub name: String,
    pub mode: i32,
    pub oid: Oid,
}

/// The kind of object an [`Oid`] refers to (spec.md §4.1). Keeps `git2`'s
/// object-type enum out of every caller's way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Commit,
    Tag,
    Tree,
    Blob,
    Other,
}

impl From<git2::ObjectType> for ObjectKind {
    fn from(kind: git2::ObjectType) -> Self {
        match kind {
            git2::ObjectType::Commit => ObjectKind::Commit,
            git2::ObjectType::Tag => ObjectKind::Tag,
            git2::ObjectType::Tree => ObjectKind::Tree,
            git2::ObjectType::Blob => ObjectKind::Blob,
            _ => ObjectKind::Other,
        }
    }
}

/// A thin wrapper over a `git2::Repository` exposing exactly the operations
/// the RSL, policy and attestations stores need (spec.md §4.1). Reference
/// updates go through [`Repository::update_ref_cas`], which is the only way
/// this crate moves a reference, so every write is a compare-and-swap.
pub struct Repository {
    backend: git2::Repository,
}

impl Repository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let backend = git2::Repository::open(path)?;
        Ok(Self { backend })
    }

    pub fn init_bare(path: impl AsRef<Path>) -> Result<Self, Error> {
        let backend = git2::Repository::init_bare(path)?;
        Ok(Self { backend })
    }

    pub fn path(&self) -> &Path {
        self.backend.path()
    }

    pub fn raw(&self) -> &git2::Repository {
        &self.backend
    }

    /// The empty tree, used as the commit tree for RSL reference and
    /// annotation entries (spec.md §6: "Commit tree is the empty tree for
    /// reference and annotation entries").
    pub fn empty_tree(&self) -> Result<Oid, Error> {
        let builder = self.backend.treebuilder(None)?;
        Ok(Oid::from_git2(builder.write()?))
    }

    pub fn read_blob(&self, oid: Oid) -> Result<Vec<u8>, Error> {
        let blob = self
            .backend
            .find_blob(oid.to_git2())
            .map_err(map_not_found)?;
        Ok(blob.content().to_vec())
    }

    pub fn write_blob(&self, bytes: &[u8]) -> Result<Oid, Error> {
        Ok(Oid::from_git2(self.backend.blob(bytes)?))
    }

    /// Build a tree from a flat list of entries (spec.md §4.1 "write tree
    /// from entries").
    pub fn write_tree(&self, entries: &[TreeEntry]) -> Result<Oid, Error> {
        let mut builder = self.backend.treebuilder(None)?;
        for entry in entries {
            builder.insert(&entry.name, entry.oid.to_git2(), entry.mode)?;
        }
        Ok(Oid::from_git2(builder.write()?))
    }

    /// Read every blob under `oid` recursively, keyed by its path relative to
    /// the tree root.
    pub fn read_tree_recursive(&self, oid: Oid) -> Result<BTreeMap<PathBuf, Oid>, Error> {
        let tree = self.backend.find_tree(oid.to_git2()).map_err(map_not_found)?;
        let mut out = BTreeMap::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    out.insert(PathBuf::from(root).join(name), Oid::from_git2(entry.id()));
                }
            }
            git2::TreeWalkResult::Ok
        })?;
        Ok(out)
    }

    pub fn blob_at(&self, commit: Oid, path: &Path) -> Result<Vec<u8>, Error> {
        let commit = self
            .backend
            .find_commit(commit.to_git2())
            .map_err(map_not_found)?;
        let tree = commit.tree()?;
        let entry = tree
            .get_path(path)
            .map_err(|e| Error::NotFound(format!("{}: {e}", path.display())))?;
        let blob = entry.to_object(&self.backend)?.peel_to_blob()?;
        Ok(blob.content().to_vec())
    }

    /// Create a commit with a single optional parent (spec.md §4.1). When
    /// `signer` is given, the commit is signed the way `radicle`'s storage
    /// layer signs refs: over the commit's own pre-auth bytes, stored as a
    /// `gpgsig`-style header understood by [`Repository::verify_commit_signature`].
    pub fn commit(
        &self,
        tree: Oid,
        parent: Option<Oid>,
        message: &str,
        signer: Option<&dyn Signer>,
    ) -> Result<Oid, Error> {
        let tree_obj = self.backend.find_tree(tree.to_git2()).map_err(map_not_found)?;
        let sig = self.backend.signature().unwrap_or_else(|_| {
            git2::Signature::now("gittuf", "gittuf@localhost").expect("static signature is valid")
        });
        let parents: Vec<git2::Commit> = match parent {
            Some(oid) => vec![self.backend.find_commit(oid.to_git2()).map_err(map_not_found)?],
            None => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        let buf = self
            .backend
            .commit_create_buffer(&sig, &sig, message, &tree_obj, &parent_refs)?;
        let buf_str = std::str::from_utf8(&buf)
            .map_err(|_| Error::Corrupt("commit buffer is not utf-8".into()))?;

        let oid = if let Some(signer) = signer {
            let signature = signer.sign(buf_str.as_bytes());
            let armored = armor_signature(&signature);
            self.backend
                .commit_signed(buf_str, &armored, Some("gpgsig"))?
        } else {
            self.backend.odb()?.write(git2::ObjectType::Commit, buf_str.as_bytes())?
        };
        Ok(Oid::from_git2(oid))
    }

    /// Extract and check a detached signature embedded in a signed commit or
    /// tag object (spec.md §4.1 "verify signature on a commit/tag object
    /// using an external verifier").
    pub fn verify_commit_signature(
        &self,
        oid: Oid,
        verify: impl FnOnce(&[u8], &Signature) -> bool,
    ) -> Result<bool, Error> {
        let (sig, content) = match self.backend.extract_signature(&oid.to_git2(), Some("gpgsig")) {
            Ok(pair) => pair,
            Err(e) if is_not_found_err(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let sig = unarmor_signature(sig.as_str().unwrap_or_default())
            .ok_or_else(|| Error::Corrupt("malformed commit signature".into()))?;

        Ok(verify(content.as_str().unwrap_or_default().as_bytes(), &sig))
    }

    pub fn resolve_reference(&self, name: &str) -> Result<Option<Oid>, Error> {
        match self.backend.refname_to_id(name) {
            Ok(oid) => Ok(Some(Oid::from_git2(oid))),
            Err(e) if is_not_found_err(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Compare-and-swap update of a reference (spec.md §4.1 "reference
    /// updates are check-and-set against a caller-supplied expected current
    /// value"). `expected = None` means the ref must not currently exist.
    pub fn update_ref_cas(
        &self,
        name: &str,
        expected: Option<Oid>,
        new: Oid,
        log_message: &str,
    ) -> Result<(), Error> {
        let current = self.resolve_reference(name)?;
        if current != expected {
            return Err(Error::RefOutOfDate {
                expected: expected.map(|o| o.to_string()),
                found: current.map(|o| o.to_string()),
            });
        }
        debug!(target: "gittuf-git", "updating {name}: {expected:?} -> {new}");
        match expected {
            Some(old) => {
                self.backend
                    .reference_matching(name, new.to_git2(), true, old.to_git2(), log_message)?;
            }
            None => {
                self.backend.reference(name, new.to_git2(), false, log_message)?;
            }
        }
        Ok(())
    }

    /// Walk a commit's first-parent history, starting at (and including) `from`.
    pub fn walk_first_parent(&self, from: Oid) -> Result<Vec<Oid>, Error> {
        let mut out = Vec::new();
        let mut cursor = Some(from);
        while let Some(oid) = cursor {
            let commit = self.backend.find_commit(oid.to_git2()).map_err(map_not_found)?;
            out.push(oid);
            cursor = commit.parent_id(0).ok().map(Oid::from_git2);
        }
        Ok(out)
    }

    pub fn parent_of(&self, oid: Oid) -> Result<Option<Oid>, Error> {
        let commit = self.backend.find_commit(oid.to_git2()).map_err(map_not_found)?;
        Ok(commit.parent_id(0).ok().map(Oid::from_git2))
    }

    pub fn is_ancestor(&self, ancestor: Oid, descendant: Oid) -> Result<bool, Error> {
        if ancestor == descendant {
            return Ok(true);
        }
        Ok(self
            .backend
            .graph_descendant_of(descendant.to_git2(), ancestor.to_git2())?)
    }

    pub fn message_of(&self, oid: Oid) -> Result<String, Error> {
        let commit = self.backend.find_commit(oid.to_git2()).map_err(map_not_found)?;
        Ok(commit.message().unwrap_or_default().to_string())
    }

    pub fn tree_of(&self, oid: Oid) -> Result<Oid, Error> {
        let commit = self.backend.find_commit(oid.to_git2()).map_err(map_not_found)?;
        Ok(Oid::from_git2(commit.tree_id()))
    }

    /// List the blob paths changed by `commit` relative to its first parent
    /// (or relative to the empty tree, for a root commit).
    pub fn changed_paths(&self, commit: Oid) -> Result<Vec<PathBuf>, Error> {
        let commit = self.backend.find_commit(commit.to_git2()).map_err(map_not_found)?;
        let tree = commit.tree()?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };
        let diff = self.backend.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), None)?;
        let mut paths = Vec::new();
        diff.foreach(
            &mut |delta, _| {
                if let Some(path) = delta.new_file().path() {
                    paths.push(path.to_path_buf());
                }
                true
            },
            None,
            None,
            None,
        )?;
        Ok(paths)
    }

    /// Create a (possibly signed) annotated tag object pointing at `target`
    /// (spec.md §4.1 "create/verify annotated tag"). When `signer` is given,
    /// the signature is appended after the tag message the way `git tag -s`
    /// appends a PGP block, armored the same way [`Repository::commit`]
    /// armors a commit signature.
    pub fn create_tag(
        &self,
        name: &str,
        target: Oid,
        target_kind: ObjectKind,
        message: &str,
        signer: Option<&dyn Signer>,
    ) -> Result<Oid, Error> {
        let sig = self.backend.signature().unwrap_or_else(|_| {
            git2::Signature::now("gittuf", "gittuf@localhost").expect("static signature is valid")
        });
        let kind_str = match target_kind {
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
            ObjectKind::Tree => "tree",
            ObjectKind::Blob => "blob",
            ObjectKind::Other => "commit",
        };
        let mut buf = format!(
            "object {}\ntype {}\ntag {}\ntagger {}\n\n{}",
            target.to_git2(),
            kind_str,
            name,
            format_signature(&sig),
            message,
        );

        let oid = if let Some(signer) = signer {
            let signature = signer.sign(buf.as_bytes());
            buf.push('\n');
            buf.push_str(&armor_signature(&signature));
            self.backend.odb()?.write(git2::ObjectType::Tag, buf.as_bytes())?
        } else {
            self.backend.odb()?.write(git2::ObjectType::Tag, buf.as_bytes())?
        };
        Ok(Oid::from_git2(oid))
    }

    /// The kind of object `oid` refers to, used to tell a tag ref's tip
    /// (an annotated tag object) apart from a branch ref's tip (a commit).
    pub fn kind_of(&self, oid: Oid) -> Result<ObjectKind, Error> {
        let obj = self.backend.find_object(oid.to_git2(), None).map_err(map_not_found)?;
        Ok(obj.kind().map(ObjectKind::from).unwrap_or(ObjectKind::Other))
    }

    /// The object a tag object points at (spec.md §4.7 "authorizations
    /// keyed by the tag's target").
    pub fn tag_target(&self, oid: Oid) -> Result<Oid, Error> {
        let tag = self.backend.find_tag(oid.to_git2()).map_err(map_not_found)?;
        Ok(Oid::from_git2(tag.target_id()))
    }

    /// Verify the signature appended to an annotated tag object's message
    /// (spec.md §4.7 "Tag verification is analogous, using the tag object's
    /// signature").
    pub fn verify_tag_signature(
        &self,
        oid: Oid,
        verify: impl FnOnce(&[u8], &Signature) -> bool,
    ) -> Result<bool, Error> {
        let odb = self.backend.odb()?;
        let object = odb.read(oid.to_git2()).map_err(map_not_found)?;
        let content = std::str::from_utf8(object.data())
            .map_err(|_| Error::Corrupt("tag object is not utf-8".into()))?;

        match split_tag_signature(content) {
            Some((signed, armored)) => {
                let sig = unarmor_signature(armored)
                    .ok_or_else(|| Error::Corrupt("malformed tag signature".into()))?;
                Ok(verify(signed.as_bytes(), &sig))
            }
            None => Ok(false),
        }
    }
}

fn format_signature(sig: &git2::Signature) -> String {
    format!(
        "{} <{}> {} {}",
        sig.name().unwrap_or("gittuf"),
        sig.email().unwrap_or("gittuf@localhost"),
        sig.when().seconds(),
        offset_str(sig.when().offset_minutes()),
    )
}

fn offset_str(offset_minutes: i32) -> String {
    let sign = if offset_minutes < 0 { '-' } else { '+' };
    let offset_minutes = offset_minutes.abs();
    format!("{sign}{:02}{:02}", offset_minutes / 60, offset_minutes % 60)
}

/// Split an annotated tag object's raw content into the signed prefix and
/// the armored signature block, mirroring `git tag -s`'s convention of
/// appending the signature after the tag message.
fn split_tag_signature(content: &str) -> Option<(&str, &str)> {
    let marker = "-----BEGIN SSH SIGNATURE-----";
    let start = content.find(marker)?;
    let signed = content[..start].trim_end_matches('\n');
    Some((signed, &content[start..]))
}

fn map_not_found(e: git2::Error) -> Error {
    if is_not_found_err(&e) {
        Error::NotFound(e.message().to_string())
    } else {
        Error::Git(e)
    }
}

/// A minimal PEM-style armoring for a raw signature, matching the `ssh-sig`
/// style block `radicle_cob::signatures::ExtendedSignature` parses, adapted
/// to this crate's single-key `Signature` type.
fn armor_signature(sig: &Signature) -> String {
    format!(
        "-----BEGIN SSH SIGNATURE-----\n{}\n-----END SSH SIGNATURE-----",
        sig
    )
}

fn unarmor_signature(pem: &str) -> Option<Signature> {
    let body = pem
        .lines()
        .filter(|l| !l.starts_with("-----"))
        .collect::<String>();
    body.parse().ok()
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
    fn test_commit_and_resolve_cas() {
        let (_dir, repo) = tempdir_repo();
        let tree = repo.empty_tree().unwrap();
        let c1 = repo.commit(tree, None, "first", None).unwrap();

        repo.update_ref_cas("refs/gittuf/test", None, c1, "init").unwrap();
        assert_eq!(repo.resolve_reference("refs/gittuf/test").unwrap(), Some(c1));

        let c2 = repo.commit(tree, Some(c1), "second", None).unwrap();
        let err = repo
            .update_ref_cas("refs/gittuf/test", None, c2, "bad cas")
            .unwrap_err();
        assert!(matches!(err, Error::RefOutOfDate { .. }));

        repo.update_ref_cas("refs/gittuf/test", Some(c1), c2, "advance")
            .unwrap();
        assert_eq!(repo.resolve_reference("refs/gittuf/test").unwrap(), Some(c2));
        assert!(repo.is_ancestor(c1, c2).unwrap());
    }

    #[test]
    fn test_signed_commit_round_trips() {
        let (_dir, repo) = tempdir_repo();
        let tree = repo.empty_tree().unwrap();
        let signer = MockSigner::from_seed([9; 32]);
        let oid = repo.commit(tree, None, "signed", Some(&signer)).unwrap();

        let key = *signer.public_key();
        let ok = repo
            .verify_commit_signature(oid, |msg, sig| key.verify(msg, sig).is_ok())
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_not_found_is_distinguished() {
        let (_dir, repo) = tempdir_repo();
        assert_eq!(repo.resolve_reference("refs/does/not/exist").unwrap(), None);
    }

    #[test]
    fn test_signed_tag_round_trips() {
        let (_dir, repo) = tempdir_repo();
        let tree = repo.empty_tree().unwrap();
        let commit = repo.commit(tree, None, "release commit", None).unwrap();
        let signer = MockSigner::from_seed([4; 32]);
        let tag = repo
            .create_tag("v1.0.0", commit, ObjectKind::Commit, "release v1.0.0", Some(&signer))
            .unwrap();

        assert_eq!(repo.kind_of(tag).unwrap(), ObjectKind::Tag);
        assert_eq!(repo.kind_of(commit).unwrap(), ObjectKind::Commit);
        assert_eq!(repo.tag_target(tag).unwrap(), commit);

        let key = *signer.public_key();
        let ok = repo
            .verify_tag_signature(tag, |msg, sig| key.verify(msg, sig).is_ok())
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_unsigned_tag_is_not_verified() {
        let (_dir, repo) = tempdir_repo();
        let tree = repo.empty_tree().unwrap();
        let commit = repo.commit(tree, None, "release commit", None).unwrap();
        let tag = repo
            .create_tag("v1.0.0", commit, ObjectKind::Commit, "release v1.0.0", None)
            .unwrap();

        let signer = MockSigner::from_seed([4; 32]);
        let key = *signer.public_key();
        let ok = repo
            .verify_tag_signature(tag, |msg, sig| key.verify(msg, sig).is_ok())
            .unwrap();
        assert!(!ok);
    }
}
