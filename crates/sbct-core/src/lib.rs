//! Shared types for the SBC trigger engine
//!
//! This crate provides the leaf types every other crate builds on:
//!
//! - [`RunCondition`] - when a trigger is allowed to evaluate
//! - [`TriggerExpression`] - a decomposed `<path><op><value>` condition
//! - [`ControlClient`] - the seam to the machine controller
//!
//! Expression *evaluation* is delegated to the controller; this crate only
//! decomposes expressions and compares the controller's textual results.

pub mod client;
pub mod expression;
pub mod run_condition;

pub use client::{ClientError, ClientResult, ControlClient};
pub use expression::{ComparisonOp, ExpressionError, ExpressionResult, TriggerExpression};
pub use run_condition::{should_evaluate, RunCondition, RunConditionError};
