//! Link state machine
//!
//! The bridge's behavior on every poll and send is a function of the
//! current link state. Transitions are explicit, finite and deterministic.

pub mod events;
pub mod machine;

pub use events::LinkEvent;
pub use machine::{FaultKind, LinkState};
