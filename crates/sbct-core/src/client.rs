//! Machine controller client seam
//!
//! Triggers never talk to the controller directly; they go through
//! [`ControlClient`], which the DSF socket client implements in production
//! and tests replace with scripted mocks. Both operations are remote calls
//! with no latency bound and must be treated as fallible.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the controller round-trip
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("controller rejected request: {0}")]
    Rejected(String),

    #[error("connection closed by controller")]
    ConnectionClosed,
}

/// Result type for controller operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Client for evaluating state and executing commands on the controller
#[async_trait]
pub trait ControlClient: Send + Sync {
    /// Evaluate an object-model path or expression, returning the result's
    /// textual form (the controller serializes booleans as `True`/`False`)
    async fn evaluate(&self, expression: &str) -> ClientResult<String>;

    /// Execute a command verbatim, returning its textual response
    async fn execute(&self, code: &str) -> ClientResult<String>;
}
