//! Intercepted code classification
//!
//! Maps `M583`-family codes onto dispatcher requests. Everything else is
//! passed through untouched.

use sbct_dispatch::TriggerRequest;
use sbct_dsf::{Code, ParameterError};

/// The codes this daemon registers for interception
pub const INTERCEPTED_CODES: [&str; 2] = ["M583", "M583.1"];

/// What to do with an intercepted code
#[derive(Debug, PartialEq)]
pub enum CodeIntent {
    /// Hand a request to the dispatcher and resolve with its outcome
    Handle(TriggerRequest),
    /// Not ours (or already processed); pass it through
    PassThrough,
}

/// Classify one intercepted code
///
/// `M583` (or `M583.1` with no parameters at all) lists; `M583.1` with
/// parameters creates or updates, which the dispatcher rejects when the
/// `T` index is missing. Parameter type errors surface so the caller can
/// resolve the code with an error message.
pub fn classify(code: &Code) -> Result<CodeIntent, ParameterError> {
    if code.is_internally_processed() || code.major_number != Some(583) {
        return Ok(CodeIntent::PassThrough);
    }

    match code.minor_number {
        None | Some(0) => Ok(CodeIntent::Handle(TriggerRequest::list())),
        Some(1) => Ok(CodeIntent::Handle(TriggerRequest {
            index: code.get_uint('T')?,
            expression: code.param('P').map(str::to_string),
            action: code.param('A').map(str::to_string),
            initially_triggered: code.get_bool('S')?,
            run_condition: code.get_int('R')?,
        })),
        Some(_) => Ok(CodeIntent::PassThrough),
    }
}
