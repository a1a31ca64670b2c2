//! Error types for the protocol layer.
//!
//! Every variant here is a `Protocol` error from the client's point of
//! view: the frame could not be turned into a well-formed [`Message`]
//! (or back). The session that produced it is closed.
//!
//! [`Message`]: crate::Message

use crate::MessageId;

/// Errors that can occur while encoding, decoding, or framing messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing envelope field,
    /// or a field of the wrong type.
    ///
    /// `id` holds the request id when it could still be read out of the
    /// broken frame, so the client can be told which request failed.
    #[error("decode failed: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        id: Option<MessageId>,
    },

    /// A frame declared (or accumulated) more bytes than allowed.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    /// The framing itself is broken (zero-length frame, bad UTF-8 line).
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The message decoded, but violates protocol rules: for example a
    /// client sending a `response`, or a request without a command.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Returns the request id recovered from the faulting frame, if any.
    pub fn salvaged_id(&self) -> Option<&MessageId> {
        match self {
            Self::Decode { id, .. } => id.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salvaged_id_decode_with_id_returns_it() {
        let source = serde_json::from_str::<u8>("x").unwrap_err();
        let err = ProtocolError::Decode {
            source,
            id: Some(MessageId::Number(9)),
        };
        assert_eq!(err.salvaged_id(), Some(&MessageId::Number(9)));
    }

    #[test]
    fn test_salvaged_id_other_variants_return_none() {
        let err = ProtocolError::FrameTooLarge { len: 10, max: 5 };
        assert!(err.salvaged_id().is_none());
        assert!(err.to_string().contains("exceeds limit"));
    }
}
