//! Metadata schemas (spec.md §3). Root and Targets documents are signed
//! payloads wrapped in [`gittuf_crypto::Envelope`]; this module only models
//! their bodies. Version/expiry dispatch across the two document kinds goes
//! through [`MetadataBody`] so callers in the policy state machine don't
//! need a match arm per metadata kind.

pub mod global_rules;
pub mod pattern;
pub mod propagation;
pub mod root;
pub mod targets;
pub mod timestamp;

pub use global_rules::GlobalRule;
pub use propagation::PropagationDirective;
pub use root::{GithubApp, Role, Root, RootError, ROOT_ROLE, TARGETS_ROLE};
pub use targets::{Rule, Targets, TargetsError};
pub use timestamp::Timestamp;

/// Common accessors shared by every top-level metadata body (spec.md §4.3
/// "version and expiry checks apply uniformly to Root and Targets
/// documents").
pub trait MetadataBody {
    fn version(&self) -> u64;
    fn expires(&self) -> Timestamp;

    fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires().is_expired_at(now)
    }
}
