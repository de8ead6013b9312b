//! Command connection
//!
//! Evaluates expressions and runs codes outside of any interception
//! context. Requests are strictly sequential per connection, so the stream
//! sits behind one async mutex; triggers that must not contend can each
//! open their own connection.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use sbct_core::{ClientError, ClientResult, ControlClient};

use crate::wire::{
    read_message, write_message, ClientInit, CommandRequest, CommandResponse, ProtocolError,
    ServerInit, PROTOCOL_VERSION,
};

struct Stream {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// A command-mode connection to the controller
pub struct CommandConnection {
    stream: Mutex<Stream>,
}

impl CommandConnection {
    /// Connect and perform the command-mode handshake
    pub async fn connect(socket_path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let socket = UnixStream::connect(socket_path.as_ref()).await?;
        let (read_half, mut writer) = socket.into_split();
        let mut reader = BufReader::new(read_half);

        let init: ServerInit = read_message(&mut reader).await?;
        if init.version < PROTOCOL_VERSION {
            return Err(ProtocolError::Handshake(format!(
                "server speaks protocol version {}, need at least {}",
                init.version, PROTOCOL_VERSION
            )));
        }

        write_message(
            &mut writer,
            &ClientInit::Command {
                version: PROTOCOL_VERSION,
            },
        )
        .await?;

        let ack: CommandResponse = read_message(&mut reader).await?;
        if !ack.success {
            return Err(ProtocolError::Handshake(
                ack.error_message
                    .unwrap_or_else(|| "connection refused".to_string()),
            ));
        }

        debug!(path = %socket_path.as_ref().display(), "command connection established");
        Ok(Self {
            stream: Mutex::new(Stream { reader, writer }),
        })
    }

    /// Evaluate an object-model expression, returning the result's textual
    /// form
    pub async fn evaluate_expression(&self, expression: &str) -> ClientResult<String> {
        let response = self
            .round_trip(CommandRequest::EvaluateExpression {
                expression: expression.to_string(),
            })
            .await?;
        Ok(response.result_text())
    }

    /// Run a code and wait for its reply
    pub async fn perform_simple_code(&self, code: &str) -> ClientResult<String> {
        let response = self
            .round_trip(CommandRequest::SimpleCode {
                code: code.to_string(),
            })
            .await?;
        Ok(response.result_text())
    }

    async fn round_trip(&self, request: CommandRequest) -> ClientResult<CommandResponse> {
        trace!(?request, "command round trip");
        let mut stream = self.stream.lock().await;
        write_message(&mut stream.writer, &request)
            .await
            .map_err(client_error)?;
        let response: CommandResponse = read_message(&mut stream.reader)
            .await
            .map_err(client_error)?;
        drop(stream);

        if response.success {
            Ok(response)
        } else {
            Err(ClientError::Rejected(
                response
                    .error_message
                    .unwrap_or_else(|| "request failed".to_string()),
            ))
        }
    }
}

#[async_trait]
impl ControlClient for CommandConnection {
    async fn evaluate(&self, expression: &str) -> ClientResult<String> {
        self.evaluate_expression(expression).await
    }

    async fn execute(&self, code: &str) -> ClientResult<String> {
        self.perform_simple_code(code).await
    }
}

fn client_error(err: ProtocolError) -> ClientError {
    match err {
        ProtocolError::Io(io) => ClientError::Io(io),
        ProtocolError::ConnectionClosed => ClientError::ConnectionClosed,
        other => ClientError::Protocol(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::UnixListener;

    /// Minimal in-process controller: handshake, then scripted replies
    async fn serve_one(listener: UnixListener) {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut writer) = socket.into_split();
        let mut reader = BufReader::new(read_half);

        write_message(&mut writer, &json!({"Version": PROTOCOL_VERSION}))
            .await
            .unwrap();
        let _init: serde_json::Value = read_message(&mut reader).await.unwrap();
        write_message(&mut writer, &json!({"Success": true}))
            .await
            .unwrap();

        loop {
            let request: serde_json::Value = match read_message(&mut reader).await {
                Ok(request) => request,
                Err(_) => return,
            };
            let reply = match request["Command"].as_str() {
                Some("EvaluateExpression") if request["Expression"] == "sensors.temp" => {
                    json!({"Success": true, "Result": 205.0})
                }
                Some("EvaluateExpression") => {
                    json!({"Success": false, "ErrorMessage": "unknown value"})
                }
                Some("SimpleCode") => json!({"Success": true, "Result": ""}),
                _ => json!({"Success": false, "ErrorMessage": "bad request"}),
            };
            write_message(&mut writer, &reply).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_evaluate_and_execute_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dcs.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(serve_one(listener));

        let connection = CommandConnection::connect(&path).await.unwrap();

        let result = connection.evaluate_expression("sensors.temp").await.unwrap();
        assert_eq!(result, "205.0");

        assert!(connection.perform_simple_code("M106 S1").await.is_ok());

        let err = connection
            .evaluate_expression("no.such.path")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_connect_fails_without_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");
        assert!(CommandConnection::connect(&path).await.is_err());
    }
}
