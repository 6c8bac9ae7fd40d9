//! gittuf: a TUF-inspired security layer for Git repositories.
//!
//! Three subsystems sit on top of [`gittuf_git`]'s object store and
//! [`gittuf_crypto`]'s signed envelopes: the [`rsl`] (an append-only,
//! hash-chained record of every reference update), the [`policy`] state
//! machine (a Root of trust delegating to Targets documents), and the
//! [`verify`] engine, which walks the former against the latter to decide
//! whether a reference's history is fully authorized. [`attestations`] stores
//! out-of-band approvals (reference authorizations, code review approvals)
//! that the verification engine may also accept in place of a direct Git
//! object signature. [`cache`] is a local-only index that makes repeat
//! verification runs incremental.

pub mod attestations;
pub mod cache;
pub mod cancel;
pub mod error;
pub mod metadata;
pub mod policy;
pub mod refs;
pub mod rsl;
pub mod verify;

#[cfg(any(test, feature = "test"))]
pub mod test;

pub use cancel::CancellationToken;
pub use error::{Error, Result};
pub use verify::{Engine, VerificationFailure};
