use gittuf_git::Oid;

use crate::error::{Error, Result};

const REFERENCE_HEADER: &str = "Reference Entry";
const ANNOTATION_HEADER: &str = "Annotation Entry";
const PROPAGATION_HEADER: &str = "Propagation Entry";

const PEM_BEGIN: &str = "-----BEGIN MESSAGE-----";
const PEM_END: &str = "-----END MESSAGE-----";

/// A single RSL record recording that `target_id` was observed at `reference`
/// (spec.md §4.4, §6 wire format). `number` is dense and monotonic: entry `n`
/// is the `n`th commit on the RSL ref counting from genesis at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub number: u64,
    pub reference: String,
    pub target_id: Oid,
}

/// Marks one or more prior entries as annotated, optionally hiding them from
/// verification (spec.md §4.4 "Annotations with `skip=true`...").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationEntry {
    pub number: u64,
    pub target_ids: Vec<Oid>,
    pub skip: bool,
    pub message: Option<String>,
}

/// Records that content was mirrored in from an upstream repository via a
/// propagation directive (spec.md §3 "Propagation directives").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationEntry {
    pub number: u64,
    pub reference: String,
    pub target_id: Oid,
    pub upstream_repository: String,
    pub upstream_entry: Oid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Reference(ReferenceEntry),
    Annotation(AnnotationEntry),
    Propagation(PropagationEntry),
}

impl Entry {
    pub fn number(&self) -> u64 {
        match self {
            Entry::Reference(e) => e.number,
            Entry::Annotation(e) => e.number,
            Entry::Propagation(e) => e.number,
        }
    }

    /// The reference this entry pertains to, if any. Annotations target
    /// other entries, not a ref directly.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Entry::Reference(e) => Some(&e.reference),
            Entry::Propagation(e) => Some(&e.reference),
            Entry::Annotation(_) => None,
        }
    }

    pub fn target_id(&self) -> Option<Oid> {
        match self {
            Entry::Reference(e) => Some(e.target_id),
            Entry::Propagation(e) => Some(e.target_id),
            Entry::Annotation(_) => None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Entry::Reference(e) => format!(
                "{REFERENCE_HEADER}\n\nRef: {}\nTarget: {}\nNumber: {}\n",
                e.reference, e.target_id, e.number
            ),
            Entry::Annotation(e) => {
                let mut body = format!("{ANNOTATION_HEADER}\n\n");
                for target in &e.target_ids {
                    body.push_str(&format!("EntryID: {target}\n"));
                }
                body.push_str(&format!("Skip: {}\n", e.skip));
                body.push_str(&format!("Number: {}\n", e.number));
                if let Some(message) = &e.message {
                    body.push_str(&format!("\n{PEM_BEGIN}\n{message}\n{PEM_END}\n"));
                }
                body
            }
            Entry::Propagation(e) => format!(
                "{PROPAGATION_HEADER}\n\nRef: {}\nTarget: {}\nNumber: {}\nUpstreamRepository: {}\nUpstreamEntry: {}\n",
                e.reference, e.target_id, e.number, e.upstream_repository, e.upstream_entry
            ),
        }
    }

    pub fn decode(message: &str) -> Result<Self> {
        let mut lines = message.lines();
        let header = lines
            .next()
            .ok_or_else(|| Error::corrupt("rsl entry", "empty commit message"))?;

        let fields = parse_fields(message)?;
        let get = |key: &str| -> Result<&str> {
            fields
                .get(key)
                .map(|s| s.as_str())
                .ok_or_else(|| Error::corrupt("rsl entry", format!("missing field '{key}'")))
        };
        let number = || -> Result<u64> {
            get("Number")?
                .parse::<u64>()
                .map_err(|_| Error::corrupt("rsl entry", "Number field is not a valid u64"))
        };
        let oid = |key: &str| -> Result<Oid> {
            get(key)?
                .parse::<Oid>()
                .map_err(|e| Error::corrupt("rsl entry", format!("{key} field: {e}")))
        };

        match header {
            _ if header == REFERENCE_HEADER => Ok(Entry::Reference(ReferenceEntry {
                number: number()?,
                reference: get("Ref")?.to_string(),
                target_id: oid("Target")?,
            })),
            _ if header == PROPAGATION_HEADER => Ok(Entry::Propagation(PropagationEntry {
                number: number()?,
                reference: get("Ref")?.to_string(),
                target_id: oid("Target")?,
                upstream_repository: get("UpstreamRepository")?.to_string(),
                upstream_entry: oid("UpstreamEntry")?,
            })),
            _ if header == ANNOTATION_HEADER => {
                let target_ids = message
                    .lines()
                    .filter_map(|line| line.strip_prefix("EntryID: "))
                    .map(|s| s.trim().parse::<Oid>())
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::corrupt("rsl entry", format!("EntryID field: {e}")))?;
                if target_ids.is_empty() {
                    return Err(Error::corrupt("rsl entry", "annotation names no target entries"));
                }
                let skip = matches!(get("Skip")?, "true");
                let message_body = extract_pem(message);
                Ok(Entry::Annotation(AnnotationEntry {
                    number: number()?,
                    target_ids,
                    skip,
                    message: message_body,
                }))
            }
            other => Err(Error::corrupt(
                "rsl entry",
                format!("unrecognized entry header '{other}'"),
            )),
        }
    }
}

fn parse_fields(message: &str) -> Result<std::collections::BTreeMap<String, String>> {
    let mut fields = std::collections::BTreeMap::new();
    for line in message.lines() {
        if line.starts_with(PEM_BEGIN) {
            break;
        }
        if let Some((key, value)) = line.split_once(": ") {
            fields.insert(key.to_string(), value.trim().to_string());
        }
    }
    Ok(fields)
}

fn extract_pem(message: &str) -> Option<String> {
    let start = message.find(PEM_BEGIN)? + PEM_BEGIN.len();
    let end = message.find(PEM_END)?;
    Some(message[start..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(byte: u8) -> Oid {
        let hex: String = std::iter::repeat(format!("{byte:02x}")).take(20).collect();
        hex.parse().unwrap()
    }

    #[test]
    fn test_reference_entry_round_trips() {
        let entry = Entry::Reference(ReferenceEntry {
            number: 7,
            reference: "refs/heads/main".to_string(),
            target_id: oid(0xab),
        });
        let encoded = entry.encode();
        let decoded = Entry::decode(&encoded).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn test_propagation_entry_round_trips() {
        let entry = Entry::Propagation(PropagationEntry {
            number: 3,
            reference: "refs/heads/main".to_string(),
            target_id: oid(0x01),
            upstream_repository: "https://example.com/upstream.git".to_string(),
            upstream_entry: oid(0x02),
        });
        let encoded = entry.encode();
        let decoded = Entry::decode(&encoded).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn test_annotation_entry_round_trips_with_message() {
        let entry = Entry::Annotation(AnnotationEntry {
            number: 9,
            target_ids: vec![oid(0x10), oid(0x11)],
            skip: true,
            message: Some("compromised key, rolling back".to_string()),
        });
        let encoded = entry.encode();
        let decoded = Entry::decode(&encoded).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn test_annotation_without_message() {
        let entry = Entry::Annotation(AnnotationEntry {
            number: 1,
            target_ids: vec![oid(0x22)],
            skip: false,
            message: None,
        });
        let decoded = Entry::decode(&entry.encode()).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn test_unrecognized_header_is_corrupt() {
        let err = Entry::decode("Nonsense Entry\n\nRef: x\n").unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }

    #[test]
    fn test_annotation_with_no_targets_is_corrupt() {
        let err = Entry::decode("Annotation Entry\n\nSkip: false\nNumber: 1\n").unwrap_err();
        assert!(matches!(err, Error::Corrupt { .. }));
    }
}
