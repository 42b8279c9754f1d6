//! Engine facade.
//!
//! - [`facade`]: [`ChatEngine`], the caller-facing operation set
//! - [`session`]: Lifecycle state machine and stream guard
//! - [`policy`]: Which boundary failures propagate and which degrade

pub mod facade;
pub mod policy;
pub mod session;

pub use facade::ChatEngine;
pub use policy::{FailurePolicy, Operation};
pub use session::EngineState;
