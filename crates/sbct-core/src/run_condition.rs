//! Run conditions
//!
//! A run condition gates *when* a trigger's expression is evaluated at all.
//! The wire encoding (the `R` code parameter) is an integer; anything outside
//! the closed set below is rejected, never coerced.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Run condition errors
#[derive(Debug, Error)]
pub enum RunConditionError {
    #[error("invalid run condition value: {0} (expected 0, 1, 2 or -1)")]
    InvalidCode(i32),
}

/// When a trigger is allowed to evaluate its expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunCondition {
    /// Evaluate on every tick (wire code 0, the default)
    #[default]
    Always,

    /// Evaluate only while a job is actively running (wire code 1)
    WhilePrinting,

    /// Evaluate only while no job is running (wire code 2)
    NotPrinting,

    /// Trigger is parked; its evaluation loop exits (wire code -1)
    Disabled,
}

impl RunCondition {
    /// Parse the integer wire encoding used by the `R` code parameter
    pub fn from_code(code: i32) -> Result<Self, RunConditionError> {
        match code {
            0 => Ok(RunCondition::Always),
            1 => Ok(RunCondition::WhilePrinting),
            2 => Ok(RunCondition::NotPrinting),
            -1 => Ok(RunCondition::Disabled),
            other => Err(RunConditionError::InvalidCode(other)),
        }
    }

    /// Integer wire encoding
    pub fn as_code(&self) -> i32 {
        match self {
            RunCondition::Always => 0,
            RunCondition::WhilePrinting => 1,
            RunCondition::NotPrinting => 2,
            RunCondition::Disabled => -1,
        }
    }

    /// Whether the gate depends on the controller's job status
    pub fn needs_job_status(&self) -> bool {
        matches!(
            self,
            RunCondition::WhilePrinting | RunCondition::NotPrinting
        )
    }
}

impl std::fmt::Display for RunCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunCondition::Always => "Always",
            RunCondition::WhilePrinting => "WhilePrinting",
            RunCondition::NotPrinting => "NotPrinting",
            RunCondition::Disabled => "Disabled",
        };
        f.write_str(name)
    }
}

/// Whether a trigger under `condition` should evaluate this tick
///
/// `is_printing` is the controller's composite job status: a job file is
/// loaded and the machine is not simulating it. `Disabled` never evaluates;
/// the evaluation loop exits before consulting the gate.
pub fn should_evaluate(condition: RunCondition, is_printing: bool) -> bool {
    match condition {
        RunCondition::Always => true,
        RunCondition::WhilePrinting => is_printing,
        RunCondition::NotPrinting => !is_printing,
        RunCondition::Disabled => false,
    }
}
