//! The Signed Envelope Layer (spec.md §4.2): wraps a payload in a set of
//! detached signatures and verifies an N-of-M threshold over them.
//!
//! Metadata envelopes (Root, Targets, global rules, attestations) are always
//! signed by raw keys in this design (§3's `Root Metadata.keys{id→P}` is
//! general, but every worked scenario in §8 and every delegation rule in
//! §4.5 resolves to `PublicKey`s) — GPG and Sigstore principals only show up
//! as *Git object* signers and approval identities, which the verification
//! engine (in the `gittuf` crate) reconciles against delegation separately.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::{PublicKey, Signature};
use crate::signer::{Signer, SignerError};

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("signer error: {0}")]
    Signer(#[from] SignerError),
    #[error("threshold must be at least 1, got {0}")]
    InvalidThreshold(usize),
    #[error("no accepted signature set meets the threshold of {threshold}: got {accepted}")]
    InvalidSignature { accepted: usize, threshold: usize },
}

/// A signature over an envelope's pre-auth encoding, keyed by the signer's
/// public key. The optional `extension` carries out-of-band verification
/// material (e.g. a Sigstore certificate chain + inclusion proof) that this
/// crate does not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    pub key: PublicKey,
    pub sig: Signature,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<Vec<u8>>,
}

/// A signed envelope: a typed payload plus zero or more detached signatures
/// over its pre-auth encoding (spec.md §3 "Signed Envelope (E)").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub payload_type: String,
    #[serde(with = "payload_base64")]
    pub payload: Vec<u8>,
    pub signatures: Vec<EnvelopeSignature>,
}

/// The pre-authentication encoding: binds `payload_type` and `payload`
/// length-prefix style so that a signature cannot be replayed against a
/// payload of a different type (spec.md §4.2, §6 "The PAE binds payload_type
/// length-prefix style").
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload_type.len() + payload.len() + 32);
    buf.extend_from_slice(b"PAE");
    buf.extend_from_slice(&[b' ']);
    buf.extend_from_slice(format!("{} ", payload_type.len()).as_bytes());
    buf.extend_from_slice(payload_type.as_bytes());
    buf.extend_from_slice(&[b' ']);
    buf.extend_from_slice(format!("{} ", payload.len()).as_bytes());
    buf.extend_from_slice(payload);
    buf
}

impl Envelope {
    /// Wrap a payload, unsigned.
    pub fn wrap(payload_type: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            payload_type: payload_type.into(),
            payload,
            signatures: Vec::new(),
        }
    }

    fn pae(&self) -> Vec<u8> {
        pae(&self.payload_type, &self.payload)
    }

    /// Sign the envelope, appending a signature. If a signature by the same
    /// key is already present, it is replaced (last-write-wins per key,
    /// spec.md §4.2).
    pub fn sign<G: Signer>(&mut self, signer: &G) -> Result<(), EnvelopeError> {
        let msg = self.pae();
        let sig = signer.try_sign(&msg)?;
        let key = *signer.public_key();

        self.signatures.retain(|s| s.key != key);
        self.signatures.push(EnvelopeSignature {
            key,
            sig,
            extension: None,
        });
        Ok(())
    }

    /// Verify the envelope's signatures against a set of trusted keys,
    /// requiring at least `threshold` of them to have produced a valid,
    /// distinct signature. Returns the full set of accepted key ids so the
    /// caller can enforce additional per-role thresholds (spec.md §4.2).
    pub fn verify(
        &self,
        verifiers: &[PublicKey],
        threshold: usize,
    ) -> Result<Vec<PublicKey>, EnvelopeError> {
        if threshold < 1 {
            return Err(EnvelopeError::InvalidThreshold(threshold));
        }
        let msg = self.pae();
        let trusted: BTreeMap<PublicKey, ()> = verifiers.iter().map(|k| (*k, ())).collect();
        let mut accepted: Vec<PublicKey> = Vec::new();

        for sig in &self.signatures {
            if !trusted.contains_key(&sig.key) {
                continue;
            }
            if sig.key.verify(&msg, &sig.sig).is_ok() && !accepted.contains(&sig.key) {
                accepted.push(sig.key);
            }
        }

        if accepted.len() < threshold {
            return Err(EnvelopeError::InvalidSignature {
                accepted: accepted.len(),
                threshold,
            });
        }
        Ok(accepted)
    }
}

mod payload_base64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&multibase::encode(multibase::Base::Base64, bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        let (_, bytes) =
            multibase::decode(&s).map_err(|e| serde::de::Error::custom(e.to_string()))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::signer::MockSigner;

    #[test]
    fn test_sign_then_verify_succeeds() {
        let signer = MockSigner::from_seed([1; 32]);
        let mut env = Envelope::wrap("application/vnd.gittuf+json", b"{}".to_vec());
        env.sign(&signer).unwrap();

        let accepted = env.verify(&[*signer.public_key()], 1).unwrap();
        assert_eq!(accepted, vec![*signer.public_key()]);
    }

    #[test]
    fn test_verify_fails_with_other_key() {
        let signer = MockSigner::from_seed([1; 32]);
        let other = MockSigner::from_seed([2; 32]);
        let mut env = Envelope::wrap("application/vnd.gittuf+json", b"{}".to_vec());
        env.sign(&signer).unwrap();

        let err = env.verify(&[*other.public_key()], 1).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidSignature { .. }));
    }

    #[test]
    fn test_resign_by_same_key_dedups() {
        let signer = MockSigner::from_seed([1; 32]);
        let mut env = Envelope::wrap("application/vnd.gittuf+json", b"{}".to_vec());
        env.sign(&signer).unwrap();
        env.sign(&signer).unwrap();

        assert_eq!(env.signatures.len(), 1);
    }

    #[test]
    fn test_threshold_zero_is_invalid() {
        let env = Envelope::wrap("application/vnd.gittuf+json", b"{}".to_vec());
        let err = env.verify(&[], 0).unwrap_err();
        assert!(matches!(err, EnvelopeError::InvalidThreshold(0)));
    }

    #[test]
    fn test_threshold_of_two_requires_two_distinct_signers() {
        let a = MockSigner::from_seed([1; 32]);
        let b = MockSigner::from_seed([2; 32]);
        let mut env = Envelope::wrap("application/vnd.gittuf+json", b"{}".to_vec());
        env.sign(&a).unwrap();

        assert!(env.verify(&[*a.public_key(), *b.public_key()], 2).is_err());

        env.sign(&b).unwrap();
        let accepted = env
            .verify(&[*a.public_key(), *b.public_key()], 2)
            .unwrap();
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn test_pae_binds_payload_type() {
        let a = pae("type/a", b"x");
        let b = pae("type/b", b"x");
        assert_ne!(a, b);
    }
}
