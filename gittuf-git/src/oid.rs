use std::{fmt, str::FromStr};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Opaque fixed-width content identifier of a Git object (spec.md §3 "Hash
/// (H)"). Both object-hash widths Git supports are represented; which one a
/// given repository uses is fixed at `git init` time and read back from the
/// backing `git2::Repository`'s oid type when a [`crate::Repository`] is
/// opened.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Oid {
    Sha1([u8; 20]),
    Sha256([u8; 32]),
}

impl Serialize for Oid {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Oid {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(D::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum OidError {
    #[error("invalid hex-encoded object id '{0}'")]
    InvalidHex(String),
    #[error("invalid object id length {0}, expected 40 or 64 hex characters")]
    InvalidLength(usize),
}

impl Oid {
    /// The well-known zero value for this hash's width (spec.md §3).
    pub fn zero(&self) -> Self {
        match self {
            Oid::Sha1(_) => Oid::Sha1([0; 20]),
            Oid::Sha256(_) => Oid::Sha256([0; 32]),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Oid::Sha1(b) => b.iter().all(|x| *x == 0),
            Oid::Sha256(b) => b.iter().all(|x| *x == 0),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Oid::Sha1(b) => b.as_slice(),
            Oid::Sha256(b) => b.as_slice(),
        }
    }

    pub(crate) fn from_git2(oid: git2::Oid) -> Self {
        let bytes = oid.as_bytes();
        if bytes.len() == 32 {
            let mut buf = [0; 32];
            buf.copy_from_slice(bytes);
            Oid::Sha256(buf)
        } else {
            let mut buf = [0; 20];
            buf[..bytes.len().min(20)].copy_from_slice(&bytes[..bytes.len().min(20)]);
            Oid::Sha1(buf)
        }
    }

    pub(crate) fn to_git2(self) -> git2::Oid {
        git2::Oid::from_bytes(self.as_bytes()).expect("Oid::to_git2: width matches libgit2's")
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({self})")
    }
}

impl FromStr for Oid {
    type Err = OidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decode = |width: usize| -> Result<Vec<u8>, OidError> {
            (0..s.len())
                .step_by(2)
                .map(|i| {
                    u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| OidError::InvalidHex(s.into()))
                })
                .collect::<Result<Vec<u8>, _>>()
                .and_then(|v| {
                    if v.len() == width {
                        Ok(v)
                    } else {
                        Err(OidError::InvalidLength(s.len()))
                    }
                })
        };

        match s.len() {
            40 => {
                let bytes = decode(20)?;
                let mut buf = [0; 20];
                buf.copy_from_slice(&bytes);
                Ok(Oid::Sha1(buf))
            }
            64 => {
                let bytes = decode(32)?;
                let mut buf = [0; 32];
                buf.copy_from_slice(&bytes);
                Ok(Oid::Sha256(buf))
            }
            n => Err(OidError::InvalidLength(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let oid = Oid::Sha1([0xab; 20]);
        let s = oid.to_string();
        let parsed: Oid = s.parse().unwrap();
        assert_eq!(oid, parsed);
    }

    #[test]
    fn test_zero() {
        let oid = Oid::Sha1([1; 20]);
        assert!(!oid.is_zero());
        assert!(oid.zero().is_zero());
    }
}
