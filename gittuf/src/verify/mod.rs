//! The Verification Engine (spec.md §4.7): the read path that decides
//! whether a reference's recorded history is fully authorized under the
//! policy in effect at each point in the Reference State Log.

pub mod engine;

pub use engine::{Engine, VerificationFailure};
