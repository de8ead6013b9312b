//! Command dispatcher
//!
//! Translates inbound registration/update/list requests into registry
//! operations and renders human-readable responses. Every validation
//! failure becomes a rendered error response; nothing panics past this
//! boundary.

pub mod dispatcher;
pub mod request;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use request::TriggerRequest;
