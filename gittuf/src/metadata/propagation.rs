use serde::{Deserialize, Serialize};

/// A directive to mirror part of an upstream repository into a path of this
/// one (spec.md §3 "Propagation directives", §6 "Propagation entries"). The
/// RSL records a Propagation entry whenever a directive's upstream ref is
/// pulled in; verification treats the copied content as if it were directly
/// committed, subject to the downstream namespace's own delegation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationDirective {
    pub name: String,
    pub upstream_repository_url: String,
    pub upstream_ref: String,
    pub downstream_ref: String,
    pub downstream_path: String,
}
