use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::{PublicKey, Signature};

/// The stable identifier of a [`Principal`]. Two principals are equal iff
/// their ids are equal (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&PublicKey> for PrincipalId {
    fn from(key: &PublicKey) -> Self {
        Self(key.to_human())
    }
}

impl From<String> for PrincipalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for PrincipalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Error, Debug)]
pub enum PrincipalError {
    #[error("principal has no verification material for this signature kind")]
    Mismatch,
    #[error("key: {0}")]
    Key(#[from] crate::key::Error),
}

/// A unit of authorization identity (spec.md §3 "Principal (P)"). Variants
/// cover the identity ecosystems gittuf recognizes; verification backends for
/// GPG and Sigstore live outside this crate (§1) and hand their already-
/// checked material to [`Principal::verify`] via the `sig` parameter, which
/// for non-key variants is expected to be a pre-verified marker rather than
/// a raw cryptographic signature the crate itself checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Principal {
    /// A raw SSH/RSA/ECDSA/Ed25519 public key.
    Key(PublicKey),
    /// A GPG key, identified by its long key id.
    Gpg { key_id: String, fingerprint: String },
    /// A Fulcio/Sigstore OIDC identity, identified by issuer + subject.
    Sigstore { issuer: String, subject: String },
}

impl Principal {
    /// The principal's stable id, used for equality, delegation lookups and
    /// threshold dedup (spec.md §4.7 step d: "deduplicate by principal ID").
    pub fn id(&self) -> PrincipalId {
        match self {
            Principal::Key(key) => PrincipalId::from(key),
            Principal::Gpg { key_id, .. } => PrincipalId(format!("gpg:{key_id}")),
            Principal::Sigstore { issuer, subject } => {
                PrincipalId(format!("sigstore:{subject}::{issuer}"))
            }
        }
    }

    /// Verify a raw Ed25519 signature against a `Key` principal. Non-`Key`
    /// variants have no in-crate verification path: their material (a GPG
    /// signature, or a Sigstore certificate + transparency-log proof) is
    /// checked by the embedder before a `Principal` claiming that identity is
    /// ever handed to the verification engine, per the external signer
    /// contract in §6.
    pub fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), PrincipalError> {
        match self {
            Principal::Key(key) => key.verify(msg, sig).map_err(PrincipalError::from),
            Principal::Gpg { .. } | Principal::Sigstore { .. } => Err(PrincipalError::Mismatch),
        }
    }

    pub fn as_key(&self) -> Option<&PublicKey> {
        match self {
            Principal::Key(key) => Some(key),
            _ => None,
        }
    }
}

impl From<PublicKey> for Principal {
    fn from(key: PublicKey) -> Self {
        Principal::Key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyPair;

    #[test]
    fn test_key_principal_id_and_verify() {
        let keypair = KeyPair::generate();
        let pk: PublicKey = keypair.pk.into();
        let sk: crate::SecretKey = keypair.sk.into();
        let principal = Principal::Key(pk);
        let sig = sk.sign(b"payload");

        assert!(principal.verify(b"payload", &sig).is_ok());
        assert_eq!(principal.id(), PrincipalId::from(&pk));
    }

    #[test]
    fn test_sigstore_principal_id_is_stable() {
        let a = Principal::Sigstore {
            issuer: "https://accounts.example".into(),
            subject: "alice@example.com".into(),
        };
        let b = Principal::Sigstore {
            issuer: "https://accounts.example".into(),
            subject: "alice@example.com".into(),
        };
        assert_eq!(a.id(), b.id());
    }
}
