//! The Git Object Store Interface (spec.md §4.1): read/write Git objects,
//! resolve and CAS-update references, walk history, and verify signatures on
//! commits and tags. Everything above this crate (RSL, policy, attestations)
//! is expressed in terms of [`Repository`] and [`Oid`] only — it never talks
//! to `git2` directly.

pub mod error;
pub mod oid;
pub mod repo;

pub use error::Error;
pub use oid::Oid;
pub use repo::{ObjectKind, Repository, TreeEntry};
