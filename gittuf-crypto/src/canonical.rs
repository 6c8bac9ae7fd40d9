//! Canonical JSON encoding, used to make the payload of a [`crate::Envelope`]
//! reproducible byte-for-byte so that signatures verify across machines and
//! across re-serialization.
//!
//! This differs from the OLPC canonical JSON spec (which prints ASCII
//! control characters 0x00-0x1f literally, making its output not valid JSON):
//! here we keep normal JSON escaping and rely on compact (no whitespace)
//! output plus `BTreeMap`/`BTreeSet`-ordered keys in every serialized type to
//! get a single, stable byte sequence per value.

use serde::Serialize;
use serde_json::ser::CompactFormatter;

/// The formatter used for every canonical payload. Key ordering is the
/// caller's responsibility: every map/set type that can appear in a signed
/// payload must be a `BTreeMap`/`BTreeSet` (or otherwise emit keys in a fixed
/// order), never a `HashMap`.
pub type CanonicalFormatter = CompactFormatter;

/// Serialize `value` to its canonical byte representation.
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter::new());
    value.serialize(&mut serializer)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_canonical_is_compact_and_sorted() {
        let mut map = BTreeMap::new();
        map.insert("b", 2);
        map.insert("a", 1);

        let bytes = to_vec(&map).unwrap();
        assert_eq!(bytes, br#"{"a":1,"b":2}"#);
    }
}
