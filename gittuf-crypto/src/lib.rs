//! Principal, signature and signed-envelope primitives for gittuf.
//!
//! This crate is the bottom of the stack: it knows nothing about Git objects,
//! reference logs or policy. It only knows how to represent a signing
//! identity ([`Principal`]), how a [`Signer`] produces a [`Signature`], and
//! how to wrap a payload in a [`Envelope`] and check an N-of-M threshold over
//! it (spec.md §4.2).

pub mod canonical;
pub mod envelope;
pub mod key;
pub mod principal;
pub mod signer;
#[cfg(any(test, feature = "test"))]
pub mod test;

pub use envelope::{pae, Envelope, EnvelopeError, EnvelopeSignature};
pub use key::{Error, KeyPair, PublicKey, SecretKey, Seed, Signature, SignatureError};
pub use principal::{Principal, PrincipalError, PrincipalId};
pub use signer::{Signer, SignerError, Verifier};
