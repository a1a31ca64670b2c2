//! Error types for the engine layer.

use databridge_protocol::{ErrorInfo, ErrorKind, StructuredValue};

/// Errors raised by the facade, the schema mapper, or the engine context.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The referenced asset, actor, or property does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The engine refused a mutation (locked asset, read-only property).
    #[error("engine rejected the change: {reason}")]
    Rejected {
        reason: String,
        details: Option<StructuredValue>,
    },

    /// A structured value does not fit the expected shape.
    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    /// A struct value carries a field its shape does not declare.
    #[error("unknown field '{path}'")]
    UnknownField { path: String },

    /// The value (or shape) has no structured representation.
    #[error("unsupported type '{type_name}' at '{path}'")]
    Unsupported { path: String, type_name: String },

    /// The engine context is not running.
    #[error("engine context unavailable: {0}")]
    Unavailable(String),

    /// An engine-side job panicked.
    #[error("engine task panicked: {0}")]
    Panicked(String),
}

impl EngineError {
    /// Shorthand for a rejection without details.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
            details: None,
        }
    }

    /// The wire error kind reported to the client.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Rejected { .. } => ErrorKind::EngineRejected,
            Self::TypeMismatch { .. } | Self::UnknownField { .. } => {
                ErrorKind::TypeMismatch
            }
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Unavailable(_) | Self::Panicked(_) => ErrorKind::Internal,
        }
    }
}

impl From<&EngineError> for ErrorInfo {
    fn from(err: &EngineError) -> Self {
        let info = ErrorInfo::new(err.kind(), err.to_string());
        match err {
            EngineError::Rejected {
                details: Some(details),
                ..
            } => info.with_details(details.clone()),
            _ => info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use databridge_protocol::Map;

    #[test]
    fn test_kind_maps_each_category() {
        assert_eq!(
            EngineError::NotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::rejected("locked").kind(),
            ErrorKind::EngineRejected
        );
        assert_eq!(
            EngineError::UnknownField { path: "a".into() }.kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            EngineError::Panicked("boom".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_error_info_rejected_carries_details() {
        let err = EngineError::Rejected {
            reason: "asset is checked out".into(),
            details: Some(Map::new().with("locked_by", "alice").into()),
        };
        let info = ErrorInfo::from(&err);
        assert_eq!(info.kind, ErrorKind::EngineRejected);
        assert_eq!(
            info.details.as_ref().and_then(|d| d.get("locked_by")),
            Some(&"alice".into())
        );
    }
}
