//! Reserved reference names (spec.md §3, §6 "Reserved reference names.
//! Exactly those in §3; no other refs are read or written").

use once_cell::sync::Lazy;

/// The Reference State Log.
pub static RSL: Lazy<&str> = Lazy::new(|| "refs/gittuf/reference-state-log");
/// Applied policy state.
pub static POLICY: Lazy<&str> = Lazy::new(|| "refs/gittuf/policy");
/// Staged policy state, not yet verified/applied.
pub static POLICY_STAGING: Lazy<&str> = Lazy::new(|| "refs/gittuf/policy-staging");
/// Detached attestations.
pub static ATTESTATIONS: Lazy<&str> = Lazy::new(|| "refs/gittuf/attestations");
/// Local-only persistent cache.
pub static PERSISTENT_CACHE: Lazy<&str> = Lazy::new(|| "refs/local/gittuf/persistent-cache");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_refs_are_distinct() {
        let all = [*RSL, *POLICY, *POLICY_STAGING, *ATTESTATIONS, *PERSISTENT_CACHE];
        for (i, a) in all.iter().enumerate() {
            for (j, b) in all.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b);
                }
            }
        }
    }
}
