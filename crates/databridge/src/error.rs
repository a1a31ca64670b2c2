//! Unified error type for the DataBridge server.

use databridge_commands::RegistryError;
use databridge_engine::EngineError;
use databridge_protocol::ProtocolError;
use databridge_session::SessionError;
use databridge_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `databridge` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate. Request
/// failures never surface here; they become error responses. These are
/// the failures that end a session or stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (framing, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (capacity, state transition, backlog).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The engine context could not be started or is gone.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A command could not be registered (duplicate or empty name).
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
