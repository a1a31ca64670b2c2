//! Frame bodies ⇄ messages.
//!
//! [`encode_frame`](crate::encode_frame) and
//! [`FrameDecoder`](crate::FrameDecoder) split the byte stream into frame
//! bodies; a [`Codec`] turns one body into a [`Message`](crate::Message)
//! and back. Every DataBridge body is a UTF-8 JSON object, so
//! [`JsonCodec`] is the only implementation.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Serializes frame bodies.
///
/// Decode failures carry no request id; the frame decoder salvages one
/// from the raw body when it can.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`), UTF-8 encoded.
///
/// ## Example
///
/// ```rust
/// use databridge_protocol::{Codec, JsonCodec, Message, MessageId, StructuredValue};
///
/// let codec = JsonCodec;
/// let msg = Message::request(MessageId::Number(1), "ping", StructuredValue::Null);
///
/// let bytes = codec.encode(&msg).unwrap();
/// let decoded: Message = codec.decode(&bytes).unwrap();
/// assert_eq!(msg, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data)
            .map_err(|source| ProtocolError::Decode { source, id: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{salvage_id, Message, MessageId};

    #[test]
    fn test_decode_malformed_body_leaves_id_to_frame_layer() {
        let body = br#"{"id": 9, "kind": "request", "command": 5}"#;
        let err = JsonCodec.decode::<Message>(body).unwrap_err();
        assert!(matches!(err, ProtocolError::Decode { .. }));
        assert_eq!(err.salvaged_id(), None);
        assert_eq!(salvage_id(body), Some(MessageId::Number(9)));
    }
}
