//! Core protocol types for DataBridge's wire format.
//!
//! These are the structures that get serialized, framed, and sent between
//! an editor client and the bridge. One [`Message`] travels per frame.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Map, ProtocolError, StructuredValue};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The correlation token of a message.
///
/// Clients pick request ids (numbers or strings, whatever their JSON-RPC
/// habit is); the bridge echoes the id back verbatim on the response.
/// Server-pushed events get server-assigned string ids.
///
/// `#[serde(untagged)]` makes `1` and `"abc"` both valid on the wire
/// without any wrapper object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Number(i64),
    String(String),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for MessageId {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// What a message is.
///
/// Only clients send `Request`s; only the bridge sends `Response`s and
/// `Event`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Event,
}

// ---------------------------------------------------------------------------
// Errors on the wire
// ---------------------------------------------------------------------------

/// The stable, machine-readable category of a failed request.
///
/// Serialized as its PascalCase variant name (`"InvalidArguments"`).
/// These strings are part of the protocol; clients branch on them, so
/// variants are never renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed frame or envelope. Fatal to the session.
    Protocol,
    UnknownCommand,
    InvalidArguments,
    TypeMismatch,
    Unsupported,
    DuplicateRequestId,
    DuplicateCommand,
    /// The engine refused a mutation (locked asset, read-only property).
    EngineRejected,
    Timeout,
    NotFound,
    /// The session already has the maximum number of requests in flight.
    Overloaded,
    BatchLimitExceeded,
    BatchRecursionBlocked,
    /// A handler panicked or the engine context is gone.
    Internal,
}

impl ErrorKind {
    /// Returns the wire string for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "Protocol",
            Self::UnknownCommand => "UnknownCommand",
            Self::InvalidArguments => "InvalidArguments",
            Self::TypeMismatch => "TypeMismatch",
            Self::Unsupported => "Unsupported",
            Self::DuplicateRequestId => "DuplicateRequestId",
            Self::DuplicateCommand => "DuplicateCommand",
            Self::EngineRejected => "EngineRejected",
            Self::Timeout => "Timeout",
            Self::NotFound => "NotFound",
            Self::Overloaded => "Overloaded",
            Self::BatchLimitExceeded => "BatchLimitExceeded",
            Self::BatchRecursionBlocked => "BatchRecursionBlocked",
            Self::Internal => "Internal",
        }
    }

    /// Returns `true` if an error of this kind ends the session.
    pub fn is_session_fatal(self) -> bool {
        matches!(self, Self::Protocol)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `error` object of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
    /// Extra structured context, e.g. the engine's rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<StructuredValue>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<StructuredValue>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The error object as a payload value, for results that embed errors
/// (batch entries).
impl From<&ErrorInfo> for StructuredValue {
    fn from(info: &ErrorInfo) -> Self {
        let mut map = Map::new()
            .with("kind", info.kind.as_str())
            .with("message", info.message.clone());
        if let Some(details) = &info.details {
            map.insert("details", details.clone());
        }
        map.into()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// The envelope for everything on the wire.
///
/// ```json
/// {"id": 1, "kind": "request", "command": "list_assets", "payload": {"path": "/Game"}}
/// {"id": 1, "kind": "response", "payload": {"assets": []}, "timing_ms": 0.4}
/// {"id": 2, "kind": "response", "error": {"kind": "InvalidArguments", "message": "missing field 'path'"}}
/// ```
///
/// Optional fields are left out of the JSON when empty, so the envelopes
/// stay readable in logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    /// The command name. Requests only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "StructuredValue::is_null")]
    pub payload: StructuredValue,
    /// Set on failed responses only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Handler wall time, set on responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing_ms: Option<f64>,
}

impl Message {
    /// Builds a request.
    pub fn request(
        id: impl Into<MessageId>,
        command: impl Into<String>,
        payload: impl Into<StructuredValue>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: MessageKind::Request,
            command: Some(command.into()),
            payload: payload.into(),
            error: None,
            timing_ms: None,
        }
    }

    /// Builds a successful response.
    pub fn response(id: MessageId, payload: StructuredValue) -> Self {
        Self {
            id,
            kind: MessageKind::Response,
            command: None,
            payload,
            error: None,
            timing_ms: None,
        }
    }

    /// Builds a failed response.
    pub fn error_response(id: MessageId, error: ErrorInfo) -> Self {
        Self {
            id,
            kind: MessageKind::Response,
            command: None,
            payload: StructuredValue::Null,
            error: Some(error),
            timing_ms: None,
        }
    }

    /// Builds a server-originated event.
    pub fn event(id: MessageId, payload: StructuredValue) -> Self {
        Self {
            id,
            kind: MessageKind::Event,
            command: None,
            payload,
            error: None,
            timing_ms: None,
        }
    }

    /// Attaches handler wall time.
    pub fn with_timing(mut self, timing_ms: f64) -> Self {
        self.timing_ms = Some(timing_ms);
        self
    }

    /// Returns `true` for a response carrying an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Checks that this is a well-formed client request and splits it into
    /// its parts.
    ///
    /// # Errors
    /// Returns `ProtocolError::InvalidMessage` if the kind is not
    /// `request`, or the command is missing or empty.
    pub fn into_request(self) -> Result<Request, ProtocolError> {
        if self.kind != MessageKind::Request {
            return Err(ProtocolError::InvalidMessage(format!(
                "clients may only send requests, got {:?} with id {}",
                self.kind, self.id
            )));
        }
        match self.command {
            Some(command) if !command.is_empty() => Ok(Request {
                id: self.id,
                command,
                payload: self.payload,
            }),
            _ => Err(ProtocolError::InvalidMessage(format!(
                "request {} has no command",
                self.id
            ))),
        }
    }
}

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: MessageId,
    pub command: String,
    pub payload: StructuredValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Map;

    #[test]
    fn test_message_id_untagged_accepts_number_and_string() {
        let n: MessageId = serde_json::from_str("7").unwrap();
        let s: MessageId = serde_json::from_str(r#""req-7""#).unwrap();
        assert_eq!(n, MessageId::Number(7));
        assert_eq!(s, MessageId::String("req-7".into()));
        assert_eq!(s.to_string(), "req-7");
    }

    #[test]
    fn test_request_json_matches_wire_format() {
        let msg = Message::request(
            1,
            "list_assets",
            Map::new().with("path", "/Game"),
        );
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"id":1,"kind":"request","command":"list_assets","payload":{"path":"/Game"}}"#
        );
    }

    #[test]
    fn test_error_response_omits_payload_and_command() {
        let msg = Message::error_response(
            MessageId::Number(2),
            ErrorInfo::new(ErrorKind::InvalidArguments, "missing field 'path'"),
        );
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(
            json,
            r#"{"id":2,"kind":"response","error":{"kind":"InvalidArguments","message":"missing field 'path'"}}"#
        );
    }

    #[test]
    fn test_decode_request_without_payload_defaults_to_null() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"a","kind":"request","command":"ping"}"#)
                .unwrap();
        assert!(msg.payload.is_null());
        assert_eq!(msg.command.as_deref(), Some("ping"));
    }

    #[test]
    fn test_into_request_rejects_response_kind() {
        let msg = Message::response(MessageId::Number(1), StructuredValue::Null);
        assert!(matches!(
            msg.into_request(),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_into_request_rejects_missing_command() {
        let mut msg = Message::request(1, "ping", StructuredValue::Null);
        msg.command = None;
        assert!(msg.into_request().is_err());
    }

    #[test]
    fn test_error_kind_serializes_as_stable_string() {
        for kind in [
            ErrorKind::Protocol,
            ErrorKind::DuplicateRequestId,
            ErrorKind::EngineRejected,
            ErrorKind::BatchRecursionBlocked,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_error_kind_only_protocol_is_session_fatal() {
        assert!(ErrorKind::Protocol.is_session_fatal());
        assert!(!ErrorKind::Timeout.is_session_fatal());
        assert!(!ErrorKind::UnknownCommand.is_session_fatal());
    }
}
