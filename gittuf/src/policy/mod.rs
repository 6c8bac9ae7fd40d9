//! The Policy State Machine (spec.md §4.5): a staged policy tree that
//! accumulates unverified edits, and an applied policy tree promoted from it
//! once it is fully verified against the previously applied state.

pub mod apply;
pub mod delegation;
pub mod history;
pub mod staging;
pub mod state;

pub use apply::{apply, bootstrap_verify};
pub use delegation::{resolve, Authorization};
pub use history::verify_trusted_states;
pub use state::PolicyState;
