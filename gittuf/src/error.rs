use thiserror::Error;

/// The core error taxonomy (spec.md §7). Low-level I/O errors propagate
/// unchanged via `#[from]`; schema-level errors are wrapped with the
/// location they were found at (metadata name, entry number) rather than
/// discarded.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corrupt {location}: {reason}")]
    Corrupt { location: String, reason: String },
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("policy violation: rule '{rule}' forbids change to '{namespace}'")]
    PolicyViolation { rule: String, namespace: String },
    #[error("reference out of date")]
    RefOutOfDate,
    #[error("expired: {0}")]
    Expired(String),
    #[error("version regression: {location} has version {found}, expected > {current}")]
    VersionRegression {
        location: String,
        found: u64,
        current: u64,
    },
    #[error("cancelled")]
    Cancelled,
    #[error("timed out")]
    Timeout,
    #[error("git: {0}")]
    Git(#[from] gittuf_git::Error),
    #[error("envelope: {0}")]
    Envelope(#[from] gittuf_crypto::EnvelopeError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn corrupt(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Corrupt {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Git(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
