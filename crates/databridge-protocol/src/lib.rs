//! Wire protocol for DataBridge.
//!
//! This crate defines the "language" that editor clients and the bridge
//! speak:
//!
//! - **Values** ([`StructuredValue`], [`Map`]): the JSON-shaped tagged
//!   union that is the only data crossing the bridge boundary.
//! - **Types** ([`Message`], [`MessageId`], [`MessageKind`],
//!   [`ErrorInfo`], [`ErrorKind`]): the envelope that travels on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes become
//!   bytes.
//! - **Framing** ([`Framing`], [`FrameDecoder`], [`encode_frame`]): how
//!   a byte stream is split into one-message frames.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw byte chunks) and the
//! session (request tracking). It knows nothing about connections or the
//! engine.
//!
//! ```text
//! Transport (bytes) → Protocol (Message) → Session (in-flight requests)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod frame;
mod types;
mod value;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use frame::{
    encode_frame, salvage_id, Decoded, FrameDecoder, Framing,
    DEFAULT_MAX_FRAME_LEN,
};
pub use types::{ErrorInfo, ErrorKind, Message, MessageId, MessageKind, Request};
pub use value::{Map, StructuredValue};
