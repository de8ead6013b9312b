//! Trigger registry and evaluation engine
//!
//! Each registered trigger is an independent state machine:
//!
//! ```text
//! Disabled ⇄ Armed (latch clear) ⇄ Fired (latch set)
//! ```
//!
//! A non-disabled trigger owns exactly one detached evaluation loop that
//! polls the controller, applies the run-condition gate and fires its action
//! on the rising edge of its condition. Failures are contained: a trigger
//! whose expression cannot be evaluated or whose action is rejected disables
//! itself and never disturbs its neighbours.
//!
//! # Key Types
//!
//! - [`Trigger`] - one automation rule with its latch and loop
//! - [`TriggerRegistry`] - index → trigger map, create/update/list
//! - [`EngineContext`] - shared controller client, poll interval and
//!   shutdown signal handed to every loop

pub mod eval;
pub mod registry;
pub mod trigger;

pub use registry::{
    EngineContext, RegisterOutcome, RegistryError, RegistryResult, TriggerRegistry, TriggerUpdate,
};
pub use trigger::{Trigger, TriggerSummary};
