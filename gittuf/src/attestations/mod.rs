//! The Attestations Store (spec.md §4.6): detached signed envelopes
//! recording human or automated sign-off on a reference update, indexed by
//! the (ref, fromID, toID) triple they cover.

pub mod store;
pub mod types;

pub use store::Attestations;
pub use types::{
    CodeReviewApproval, ReferenceAuthorization, PREDICATE_CODE_REVIEW_APPROVAL,
    PREDICATE_REFERENCE_AUTHORIZATION,
};
