use gittuf_crypto::Signer;
use gittuf_git::{Oid, Repository};

use crate::error::{Error, Result};
use crate::refs::RSL;

use super::entry::{AnnotationEntry, Entry, PropagationEntry, ReferenceEntry};

/// The append-only ledger (spec.md §4.4). Every write goes through
/// [`Repository::update_ref_cas`] against the tip this handle last observed,
/// so a concurrent writer elsewhere causes [`crate::Error::RefOutOfDate`]
/// rather than silently clobbering history.
pub struct Rsl<'a> {
    repo: &'a Repository,
}

impl<'a> Rsl<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    fn tip(&self) -> Result<Option<Oid>> {
        Ok(self.repo.resolve_reference(*RSL)?)
    }

    fn next_number(&self) -> Result<u64> {
        match self.tip()? {
            None => Ok(1),
            Some(tip) => Ok(self.parse(tip)?.number() + 1),
        }
    }

    fn parse(&self, oid: Oid) -> Result<Entry> {
        let message = self.repo.message_of(oid)?;
        Entry::decode(&message)
    }

    fn append(&self, entry: &Entry, signer: Option<&dyn Signer>) -> Result<Oid> {
        let parent = self.tip()?;
        let tree = self.repo.empty_tree()?;
        let oid = self.repo.commit(tree, parent, &entry.encode(), signer)?;
        self.repo
            .update_ref_cas(*RSL, parent, oid, "gittuf: rsl update")?;
        Ok(oid)
    }

    pub fn append_reference(
        &self,
        reference: &str,
        target_id: Oid,
        signer: Option<&dyn Signer>,
    ) -> Result<Oid> {
        let entry = Entry::Reference(ReferenceEntry {
            number: self.next_number()?,
            reference: reference.to_string(),
            target_id,
        });
        self.append(&entry, signer)
    }

    /// Spec.md's annotations may only target reference/propagation entries,
    /// not other annotations (Open Question #2, decided in DESIGN.md):
    /// stacking annotations on annotations has no defined meaning for
    /// verification's skip-set, so it is rejected here rather than accepted
    /// and silently ignored later.
    pub fn append_annotation(
        &self,
        target_ids: Vec<Oid>,
        skip: bool,
        message: Option<String>,
        signer: Option<&dyn Signer>,
    ) -> Result<Oid> {
        for target in &target_ids {
            if matches!(self.parse(*target)?, Entry::Annotation(_)) {
                return Err(Error::corrupt(
                    "rsl entry",
                    format!("annotation cannot target another annotation ({target})"),
                ));
            }
        }
        let entry = Entry::Annotation(AnnotationEntry {
            number: self.next_number()?,
            target_ids,
            skip,
            message,
        });
        self.append(&entry, signer)
    }

    pub fn append_propagation(
        &self,
        reference: &str,
        target_id: Oid,
        upstream_repository: &str,
        upstream_entry: Oid,
        signer: Option<&dyn Signer>,
    ) -> Result<Oid> {
        let entry = Entry::Propagation(PropagationEntry {
            number: self.next_number()?,
            reference: reference.to_string(),
            target_id,
            upstream_repository: upstream_repository.to_string(),
            upstream_entry,
        });
        self.append(&entry, signer)
    }

    /// The tip entry, parsed (spec.md §4.4 `latest()`).
    pub fn latest(&self) -> Result<(Oid, Entry)> {
        let tip = self
            .tip()?
            .ok_or_else(|| Error::NotFound("rsl is empty".to_string()))?;
        Ok((tip, self.parse(tip)?))
    }

    /// The entry preceding `entry_id`, or `NotFound` at genesis (spec.md
    /// §4.4 `parent()`).
    pub fn parent(&self, entry_id: Oid) -> Result<(Oid, Entry)> {
        let parent = self
            .repo
            .parent_of(entry_id)?
            .ok_or_else(|| Error::NotFound("rsl entry has no parent".to_string()))?;
        Ok((parent, self.parse(parent)?))
    }

    /// The most recent reference or propagation entry targeting `reference`,
    /// walking back across unrelated entries (spec.md §4.4
    /// `latest_reference_for`).
    pub fn latest_reference_for(&self, reference: &str) -> Result<Option<(Oid, Entry)>> {
        let mut cursor = self.tip()?;
        while let Some(oid) = cursor {
            let entry = self.parse(oid)?;
            if entry.reference() == Some(reference) {
                return Ok(Some((oid, entry)));
            }
            cursor = self.repo.parent_of(oid)?;
        }
        Ok(None)
    }

    /// Every annotation entry in the log, oldest first, keyed by the entries
    /// they target (spec.md §4.7 step 2: "collect annotations keyed by the
    /// entry they target").
    pub fn annotations(&self) -> Result<Vec<(Oid, AnnotationEntry)>> {
        let mut out = Vec::new();
        let mut cursor = self.tip()?;
        while let Some(oid) = cursor {
            if let Entry::Annotation(annotation) = self.parse(oid)? {
                out.push((oid, annotation));
            }
            cursor = self.repo.parent_of(oid)?;
        }
        out.reverse();
        Ok(out)
    }

    /// Walk every reference/propagation entry pertaining to `reference`,
    /// newest first, down to (and including) `down_to` if given.
    pub fn history_for(&self, reference: &str, down_to: Option<Oid>) -> Result<Vec<(Oid, Entry)>> {
        let mut out = Vec::new();
        let mut cursor = self.tip()?;
        while let Some(oid) = cursor {
            let entry = self.parse(oid)?;
            if entry.reference() == Some(reference) {
                out.push((oid, entry));
            }
            if Some(oid) == down_to {
                break;
            }
            cursor = self.repo.parent_of(oid)?;
        }
        Ok(out)
    }
}
