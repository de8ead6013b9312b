//! Duet Software Framework socket client
//!
//! Two connection kinds over the controller's UNIX socket, both speaking
//! newline-delimited JSON:
//!
//! - [`CommandConnection`] - evaluate object-model expressions and run
//!   codes; implements [`sbct_core::ControlClient`]
//! - [`InterceptConnection`] - receive codes matching a filter and resolve
//!   or ignore each one
//!
//! Every connection starts with the same handshake: the server announces
//! its protocol version, the client declares its mode, the server acks.

pub mod command;
pub mod intercept;
pub mod wire;

pub use command::CommandConnection;
pub use intercept::InterceptConnection;
pub use wire::{Code, CodeFlag, CodeParameter, MessageType, ParameterError, ProtocolError};
