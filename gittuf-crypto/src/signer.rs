use std::ops::Deref;
use std::sync::Arc;

use thiserror::Error;

use crate::key::{PublicKey, Signature};

/// Error returned if signing fails, e.g. because the backing HSM, GPG agent or
/// Sigstore OIDC flow was unavailable. The core never constructs one of these
/// directly; it's produced by whatever [`Signer`] implementation the embedder
/// wires in (out of scope for this crate per spec.md §1).
#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct SignerError {
    #[from]
    source: Arc<dyn std::error::Error + Send + Sync>,
}

impl SignerError {
    pub fn new(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            source: Arc::new(source),
        }
    }
}

/// The abstract signer contract (§6 "External signer contract"). Concrete
/// backends (SSH agent, GPG, X.509, Sigstore OIDC) live outside this crate;
/// they only need to implement this trait.
pub trait Signer: Send + Sync {
    /// Return this signer's public/verification key.
    fn public_key(&self) -> &PublicKey;
    /// Sign a message and return the signature.
    fn sign(&self, msg: &[u8]) -> Signature;
    /// Sign a message and return the signature, or fail if the signer was
    /// unable to produce one.
    fn try_sign(&self, msg: &[u8]) -> Result<Signature, SignerError>;
}

impl<T> Signer for Box<T>
where
    T: Signer + ?Sized,
{
    fn public_key(&self) -> &PublicKey {
        self.deref().public_key()
    }

    fn sign(&self, msg: &[u8]) -> Signature {
        self.deref().sign(msg)
    }

    fn try_sign(&self, msg: &[u8]) -> Result<Signature, SignerError> {
        self.deref().try_sign(msg)
    }
}

/// The other half of the external signer contract: verify a signature
/// produced out-of-band (e.g. a Sigstore bundle whose certificate chain and
/// transparency-log inclusion proof the embedder has already checked).
pub trait Verifier {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), crate::key::Error>;
}

impl Verifier for PublicKey {
    fn verify(&self, msg: &[u8], sig: &Signature) -> Result<(), crate::key::Error> {
        PublicKey::verify(self, msg, sig)
    }
}
