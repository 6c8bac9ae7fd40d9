use gittuf_crypto::PrincipalId;
use gittuf_git::Oid;
use serde::{Deserialize, Serialize};

/// In-toto predicate type for a reference authorization (spec.md §6
/// "Envelope payload type identifiers").
pub const PREDICATE_REFERENCE_AUTHORIZATION: &str = "https://gittuf.dev/reference-authorization/v0.1";
/// In-toto predicate type for a code review approval (spec.md §6).
pub const PREDICATE_CODE_REVIEW_APPROVAL: &str = "https://gittuf.dev/github-pull-request-approval/v0.1";

/// A human's (or automation's) attestation that a reference update from
/// `from_target` to `to_target` is authorized (spec.md §4.6
/// "reference-authorizations/<ref>/<fromID>-<toID>").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAuthorization {
    pub reference: String,
    pub from_target: Oid,
    pub to_target: Oid,
}

/// An approval recorded by an external code-review system (e.g. a GitHub
/// pull request) for the same (ref, fromID, toID) triple, scoped to the
/// review system that issued it (spec.md §4.6
/// "code-review-approvals/<ref>/<fromID>-<toID>/<system-name>"). The envelope
/// wrapping this payload is signed by the review system's own integration
/// key (a `root.github_apps` entry); `approver` is the reviewer's identity,
/// trusted on the strength of that signature rather than one of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeReviewApproval {
    pub reference: String,
    pub from_target: Oid,
    pub to_target: Oid,
    pub system_name: String,
    pub review_host: String,
    pub review_id: String,
    pub approver: PrincipalId,
}
