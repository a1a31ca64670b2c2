//! Error types for the command layer.

use databridge_engine::EngineError;
use databridge_protocol::{ErrorInfo, ErrorKind};
use databridge_session::SessionError;

/// Why a command failed. Every variant becomes an error response.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// The payload does not match the command's argument schema, or a
    /// value is semantically invalid. The message names the field.
    #[error("{0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("batch of {len} commands exceeds the limit of {max}")]
    BatchLimitExceeded { len: usize, max: usize },

    #[error("'{0}' cannot run inside a batch")]
    BatchRecursionBlocked(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownCommand(_) => ErrorKind::UnknownCommand,
            Self::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Self::Engine(e) => e.kind(),
            Self::Session(e) => e.kind(),
            Self::BatchLimitExceeded { .. } => ErrorKind::BatchLimitExceeded,
            Self::BatchRecursionBlocked(_) => ErrorKind::BatchRecursionBlocked,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<&CommandError> for ErrorInfo {
    fn from(err: &CommandError) -> Self {
        match err {
            CommandError::Engine(e) => ErrorInfo::from(e),
            CommandError::Session(e) => ErrorInfo::from(e),
            other => ErrorInfo::new(other.kind(), other.to_string()),
        }
    }
}

/// Errors building a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),

    #[error("command names must be non-empty")]
    EmptyName,
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateCommand(_) => ErrorKind::DuplicateCommand,
            Self::EmptyName => ErrorKind::InvalidArguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_invalid_arguments_keeps_message() {
        let info = ErrorInfo::from(&CommandError::invalid("missing field 'path'"));
        assert_eq!(info.kind, ErrorKind::InvalidArguments);
        assert_eq!(info.message, "missing field 'path'");
    }

    #[test]
    fn test_kind_delegates_to_engine_error() {
        let err = CommandError::from(EngineError::NotFound("/Game/X".into()));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_registry_duplicate_kind() {
        assert_eq!(
            RegistryError::DuplicateCommand("ping".into()).kind(),
            ErrorKind::DuplicateCommand
        );
    }
}
