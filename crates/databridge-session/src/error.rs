//! Error types for the session layer.

use databridge_protocol::{ErrorInfo, ErrorKind, MessageId};

use crate::{SessionId, SessionState};

/// Errors that can occur during session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server already has the maximum number of live sessions.
    #[error("session limit of {max} reached")]
    CapacityExceeded { max: usize },

    /// No session exists with the given id.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The requested lifecycle transition is not allowed.
    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// A request with this id is still awaiting its response.
    #[error("request id {0} is already in flight")]
    DuplicateRequestId(MessageId),

    /// The session already has `limit` requests in flight.
    #[error("too many requests in flight (limit {limit})")]
    Overloaded { limit: usize },

    /// The peer stopped reading and the outbound queue stayed full.
    #[error("outbound queue of {capacity} messages stayed full, peer is not reading")]
    Backlogged { capacity: usize },

    /// The session is not accepting new requests in its current state.
    #[error("session is {0}, not accepting requests")]
    NotAccepting(SessionState),
}

impl SessionError {
    /// The wire error kind reported to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateRequestId(_) => ErrorKind::DuplicateRequestId,
            Self::Overloaded { .. }
            | Self::CapacityExceeded { .. }
            | Self::Backlogged { .. }
            | Self::NotAccepting(_) => ErrorKind::Overloaded,
            Self::NotFound(_) | Self::InvalidTransition { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<&SessionError> for ErrorInfo {
    fn from(err: &SessionError) -> Self {
        ErrorInfo::new(err.kind(), err.to_string())
    }
}
