//! Intercept connection
//!
//! Receives codes matching a filter before the firmware sees them. Every
//! received code must be answered with exactly one resolve or ignore before
//! the next one arrives; the connection is owned by a single receive loop,
//! so methods take `&mut self`.

use std::path::Path;

use tokio::io::BufReader;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tracing::{debug, trace};

use crate::wire::{
    read_message, write_message, ClientInit, Code, CommandResponse, InterceptAction, MessageType,
    ProtocolError, ServerInit, PROTOCOL_VERSION,
};

/// An intercept-mode connection to the controller
pub struct InterceptConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl InterceptConnection {
    /// Connect and register the code filter
    pub async fn connect(
        socket_path: impl AsRef<Path>,
        filter: &[&str],
    ) -> Result<Self, ProtocolError> {
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
            &ClientInit::Intercept {
                version: PROTOCOL_VERSION,
                filter: filter.iter().map(|code| code.to_string()).collect(),
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

        debug!(
            path = %socket_path.as_ref().display(),
            ?filter,
            "intercept connection established"
        );
        Ok(Self { reader, writer })
    }

    /// Wait for the next intercepted code
    pub async fn receive_code(&mut self) -> Result<Code, ProtocolError> {
        let code: Code = read_message(&mut self.reader).await?;
        trace!(code = %code.short_name(), "received code");
        Ok(code)
    }

    /// Answer the pending code and stop its processing
    pub async fn resolve(
        &mut self,
        message_type: MessageType,
        content: &str,
    ) -> Result<(), ProtocolError> {
        write_message(
            &mut self.writer,
            &InterceptAction::Resolve {
                r#type: message_type,
                content: content.to_string(),
            },
        )
        .await
    }

    /// Pass the pending code on unhandled
    pub async fn ignore(&mut self) -> Result<(), ProtocolError> {
        write_message(&mut self.writer, &InterceptAction::Ignore).await
    }
}
