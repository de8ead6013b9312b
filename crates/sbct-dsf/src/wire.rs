//! Wire types and framing
//!
//! Messages are single-line JSON objects with PascalCase field names,
//! matching the controller's serialization. Framing helpers read and write
//! one message per line.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Protocol version this client speaks
pub const PROTOCOL_VERSION: u16 = 1;

/// Wire protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// First message on every connection, sent by the server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServerInit {
    pub version: u16,
}

/// The client's reply declaring what kind of connection this is
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "Mode", rename_all = "PascalCase")]
pub enum ClientInit {
    /// Command connection: evaluate expressions, run codes
    #[serde(rename_all = "PascalCase")]
    Command { version: u16 },

    /// Intercept connection: receive codes matching the filter
    #[serde(rename_all = "PascalCase")]
    Intercept { version: u16, filter: Vec<String> },
}

/// Requests on a command connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "Command", rename_all = "PascalCase")]
pub enum CommandRequest {
    #[serde(rename_all = "PascalCase")]
    EvaluateExpression { expression: String },

    #[serde(rename_all = "PascalCase")]
    SimpleCode { code: String },
}

/// Replies on a command connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandResponse {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CommandResponse {
    /// Textual form of the result, matching the controller's serialization
    /// of each value kind (`True`/`False` for booleans)
    pub fn result_text(&self) -> String {
        match &self.result {
            None | Some(serde_json::Value::Null) => "null".to_string(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Bool(true)) => "True".to_string(),
            Some(serde_json::Value::Bool(false)) => "False".to_string(),
            Some(other) => other.to_string(),
        }
    }
}

/// Replies from the client on an intercept connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "Command", rename_all = "PascalCase")]
pub enum InterceptAction {
    /// Pass the code on unhandled
    Ignore,

    /// Answer the code with a message and stop its processing
    #[serde(rename_all = "PascalCase")]
    Resolve {
        r#type: MessageType,
        content: String,
    },
}

/// Severity of a resolved code's reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    Success,
    Warning,
    Error,
}

/// Flags the controller attaches to an intercepted code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeFlag {
    /// Processed internally by the firmware; must be passed through
    IsInternallyProcessed,
    /// Originates from a macro file rather than an operator
    IsFromMacro,
}

/// One parameter of an intercepted code, e.g. `T2` or `P"expr"`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CodeParameter {
    pub letter: char,
    pub value: String,
}

/// An intercepted code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Code {
    pub major_number: Option<u16>,
    pub minor_number: Option<u8>,
    pub parameters: Vec<CodeParameter>,
    pub flags: Vec<CodeFlag>,
}

/// Typed parameter extraction errors
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("invalid {letter} parameter '{value}': expected {expected}")]
    Invalid {
        letter: char,
        value: String,
        expected: &'static str,
    },
}

impl Code {
    /// Raw value of a parameter, if present
    pub fn param(&self, letter: char) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.letter == letter)
            .map(|p| p.value.as_str())
    }

    /// Parameter as a non-negative integer
    pub fn get_uint(&self, letter: char) -> Result<Option<u32>, ParameterError> {
        self.param(letter)
            .map(|value| {
                value.parse::<u32>().map_err(|_| ParameterError::Invalid {
                    letter,
                    value: value.to_string(),
                    expected: "a non-negative integer",
                })
            })
            .transpose()
    }

    /// Parameter as a signed integer
    pub fn get_int(&self, letter: char) -> Result<Option<i32>, ParameterError> {
        self.param(letter)
            .map(|value| {
                value.parse::<i32>().map_err(|_| ParameterError::Invalid {
                    letter,
                    value: value.to_string(),
                    expected: "an integer",
                })
            })
            .transpose()
    }

    /// Parameter as a boolean (`0`/`1`, `true`/`false`)
    pub fn get_bool(&self, letter: char) -> Result<Option<bool>, ParameterError> {
        self.param(letter)
            .map(|value| match value {
                "0" | "false" => Ok(false),
                "1" | "true" => Ok(true),
                other => Err(ParameterError::Invalid {
                    letter,
                    value: other.to_string(),
                    expected: "0, 1, true or false",
                }),
            })
            .transpose()
    }

    /// Whether the firmware already processed this code internally
    pub fn is_internally_processed(&self) -> bool {
        self.flags.contains(&CodeFlag::IsInternallyProcessed)
    }

    /// Short `M583.1`-style rendering for error messages
    pub fn short_name(&self) -> String {
        match (self.major_number, self.minor_number) {
            (Some(major), Some(minor)) => format!("M{major}.{minor}"),
            (Some(major), None) => format!("M{major}"),
            _ => "M?".to_string(),
        }
    }
}

/// Read one JSON-line message
pub(crate) async fn read_message<T, R>(reader: &mut BufReader<R>) -> Result<T, ProtocolError>
where
    T: DeserializeOwned,
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        return Err(ProtocolError::ConnectionClosed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// Write one JSON-line message
pub(crate) async fn write_message<T, W>(writer: &mut W, message: &T) -> Result<(), ProtocolError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
