//! Framing: splitting a byte stream into one-message frames.
//!
//! A stream socket delivers bytes in arbitrary chunks. A frame may arrive
//! split over several reads, or several frames may arrive in one read.
//! [`FrameDecoder`] keeps the unconsumed tail between reads so decoding can
//! be retried as more bytes arrive, without re-parsing what was already
//! consumed.
//!
//! Two framings are supported:
//!
//! ```text
//! LengthPrefixed:  [u32 big-endian length][JSON body of that length]
//! LineDelimited:   JSON body\n
//! ```

use serde::{Deserialize, Serialize};

use crate::{Codec, JsonCodec, Message, MessageId, ProtocolError};

/// Default upper bound on one frame body: 16 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX_LEN: usize = 4;

/// How frames are delimited on the stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// 4-byte big-endian length, then the body.
    #[default]
    LengthPrefixed,
    /// One JSON document per `\n`-terminated line. Blank lines are ignored.
    LineDelimited,
}

/// The outcome of one decode attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A complete frame: the message and how many bytes it occupied.
    Frame { message: Message, consumed: usize },
    /// The buffer holds only part of a frame.
    NeedMoreData,
}

impl Framing {
    /// Tries to decode one frame from the start of `buf`.
    ///
    /// # Errors
    /// - `ProtocolError::InvalidFrame` for a zero-length frame
    /// - `ProtocolError::FrameTooLarge` when the frame exceeds `max_len`
    /// - `ProtocolError::Decode` when the body is not a valid message
    pub fn decode<C: Codec>(
        self,
        codec: &C,
        buf: &[u8],
        max_len: usize,
    ) -> Result<Decoded, ProtocolError> {
        self.decode_from(codec, buf, max_len, 0)
    }

    /// Like [`decode`](Self::decode), but for line framing the caller
    /// promises `buf[..scan_from]` holds no newline that ends a non-blank
    /// line, so scanning can resume there.
    fn decode_from<C: Codec>(
        self,
        codec: &C,
        buf: &[u8],
        max_len: usize,
        scan_from: usize,
    ) -> Result<Decoded, ProtocolError> {
        match self {
            Self::LengthPrefixed => decode_length_prefixed(codec, buf, max_len),
            Self::LineDelimited => {
                decode_line(codec, buf, max_len, scan_from)
            }
        }
    }
}

fn decode_length_prefixed<C: Codec>(
    codec: &C,
    buf: &[u8],
    max_len: usize,
) -> Result<Decoded, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_LEN {
        return Ok(Decoded::NeedMoreData);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len == 0 {
        return Err(ProtocolError::InvalidFrame("zero-length frame".into()));
    }
    if len > max_len {
        return Err(ProtocolError::FrameTooLarge { len, max: max_len });
    }
    let end = LENGTH_PREFIX_LEN + len;
    if buf.len() < end {
        return Ok(Decoded::NeedMoreData);
    }
    let message = decode_body(codec, &buf[LENGTH_PREFIX_LEN..end])?;
    Ok(Decoded::Frame {
        message,
        consumed: end,
    })
}

fn decode_line<C: Codec>(
    codec: &C,
    buf: &[u8],
    max_len: usize,
    scan_from: usize,
) -> Result<Decoded, ProtocolError> {
    let mut scan = scan_from.min(buf.len());
    while let Some(offset) = buf[scan..].iter().position(|b| *b == b'\n') {
        let end = scan + offset;
        let line = &buf[..end];
        // Leading blank lines stay part of the next frame; JSON parsing
        // skips the whitespace.
        if line.iter().all(u8::is_ascii_whitespace) {
            scan = end + 1;
            continue;
        }
        if line.len() > max_len {
            return Err(ProtocolError::FrameTooLarge {
                len: line.len(),
                max: max_len,
            });
        }
        let message = decode_body(codec, line)?;
        return Ok(Decoded::Frame {
            message,
            consumed: end + 1,
        });
    }
    if buf.len() > max_len {
        return Err(ProtocolError::FrameTooLarge {
            len: buf.len(),
            max: max_len,
        });
    }
    Ok(Decoded::NeedMoreData)
}

fn decode_body<C: Codec>(
    codec: &C,
    body: &[u8],
) -> Result<Message, ProtocolError> {
    codec.decode(body).map_err(|e| match e {
        ProtocolError::Decode { source, id: None } => ProtocolError::Decode {
            source,
            id: salvage_id(body),
        },
        other => other,
    })
}

/// Reads just the `id` field out of a frame body that failed to decode as a
/// full message.
pub fn salvage_id(body: &[u8]) -> Option<MessageId> {
    #[derive(Deserialize)]
    struct IdOnly {
        id: MessageId,
    }
    serde_json::from_slice::<IdOnly>(body).ok().map(|m| m.id)
}

/// Encodes a message as one complete frame.
///
/// # Errors
/// Returns `ProtocolError::Encode` if serialization fails, or
/// `ProtocolError::FrameTooLarge` if the body does not fit a `u32` prefix.
pub fn encode_frame<C: Codec>(
    codec: &C,
    framing: Framing,
    message: &Message,
) -> Result<Vec<u8>, ProtocolError> {
    let body = codec.encode(message)?;
    match framing {
        Framing::LengthPrefixed => {
            let len = u32::try_from(body.len()).map_err(|_| {
                ProtocolError::FrameTooLarge {
                    len: body.len(),
                    max: u32::MAX as usize,
                }
            })?;
            let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body.len());
            frame.extend_from_slice(&len.to_be_bytes());
            frame.extend_from_slice(&body);
            Ok(frame)
        }
        Framing::LineDelimited => {
            let mut frame = body;
            frame.push(b'\n');
            Ok(frame)
        }
    }
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// A resumable decoder that owns the residual bytes of a stream.
///
/// ```rust
/// use databridge_protocol::{
///     encode_frame, FrameDecoder, Framing, JsonCodec, Message, StructuredValue,
/// };
///
/// let frame = encode_frame(
///     &JsonCodec,
///     Framing::LengthPrefixed,
///     &Message::request(1, "ping", StructuredValue::Null),
/// ).unwrap();
///
/// let mut decoder = FrameDecoder::new(Framing::LengthPrefixed);
/// decoder.push(&frame[..3]);
/// assert!(decoder.next_message().unwrap().is_none());
/// decoder.push(&frame[3..]);
/// assert!(decoder.next_message().unwrap().is_some());
/// ```
#[derive(Debug)]
pub struct FrameDecoder<C: Codec = JsonCodec> {
    codec: C,
    framing: Framing,
    max_frame_len: usize,
    buf: Vec<u8>,
    /// Line framing: bytes before this offset were already scanned.
    scanned: usize,
}

impl FrameDecoder<JsonCodec> {
    /// Creates a JSON decoder with the default frame limit.
    pub fn new(framing: Framing) -> Self {
        Self::with_codec(JsonCodec, framing)
    }
}

impl<C: Codec> FrameDecoder<C> {
    pub fn with_codec(codec: C, framing: Framing) -> Self {
        Self {
            codec,
            framing,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            buf: Vec::new(),
            scanned: 0,
        }
    }

    /// Sets the largest accepted frame body, in bytes.
    pub fn max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max;
        self
    }

    /// Appends bytes read from the stream.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered, not yet consumed bytes.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Decodes the next complete message, if the buffer holds one.
    ///
    /// Returns `Ok(None)` when more bytes are needed. After an error the
    /// stream is desynchronized and the decoder should be discarded.
    ///
    /// # Errors
    /// Any [`ProtocolError`] from [`Framing::decode`].
    pub fn next_message(&mut self) -> Result<Option<Message>, ProtocolError> {
        match self.framing.decode_from(
            &self.codec,
            &self.buf,
            self.max_frame_len,
            self.scanned,
        )? {
            Decoded::Frame { message, consumed } => {
                self.buf.drain(..consumed);
                self.scanned = 0;
                Ok(Some(message))
            }
            Decoded::NeedMoreData => {
                if self.framing == Framing::LineDelimited {
                    self.scanned = self.buf.len();
                }
                Ok(None)
            }
        }
    }
}
