use thiserror::Error;

use crate::oid::OidError;

/// Failure modes of the Git Object Store Interface (spec.md §4.1).
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("reference out of date: expected {expected:?}, found {found:?}")]
    RefOutOfDate {
        expected: Option<String>,
        found: Option<String>,
    },
    #[error("corrupt object: {0}")]
    Corrupt(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("oid: {0}")]
    Oid(#[from] OidError),
    #[error("git: {0}")]
    Git(#[from] git2::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Git(e) => is_not_found_err(e),
            _ => false,
        }
    }
}

/// Whether a raw `git2::Error` corresponds to a missing object/reference, the
/// same classification `radicle::git::is_not_found_err` performs.
pub fn is_not_found_err(err: &git2::Error) -> bool {
    matches!(
        err.code(),
        git2::ErrorCode::NotFound | git2::ErrorCode::UnbornBranch
    )
}
