//! Transport abstraction layer for DataBridge.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the stream sockets the bridge listens on. A connection moves raw byte
//! chunks; framing them into messages is the protocol layer's job.
//!
//! # Feature Flags
//!
//! - `tcp` (default): TCP transport via `tokio::net`
//!
//! On Unix targets a local-socket transport ([`UnixTransport`]) is always
//! available.

mod error;
mod stream;
#[cfg(feature = "tcp")]
mod tcp;
#[cfg(unix)]
mod unix;

pub use error::TransportError;
pub use stream::StreamConnection;
#[cfg(feature = "tcp")]
pub use tcp::{TcpConnection, TcpTransport};
#[cfg(unix)]
pub use unix::{UnixConnection, UnixTransport};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs across all transports.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-wide unique id.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections.
///
/// Methods return `Send` futures so the server can drive a transport from
/// inside spawned tasks regardless of the concrete socket type.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    ///
    /// Cancel-safe: dropping the future before it completes loses no
    /// connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Stops accepting connections and releases the listening endpoint.
    fn shutdown(
        &mut self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Human-readable description of the listening endpoint.
    fn local_description(&self) -> String;
}

/// A single connection that can send and receive bytes.
pub trait Connection: Send + Sync + 'static {
    /// Writes all of `data` to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next chunk of bytes from the remote peer.
    ///
    /// Chunk boundaries carry no meaning. Returns `Ok(None)` when the peer
    /// closed the stream.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the write side of the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Describes the remote peer, for logs.
    fn peer(&self) -> &str;
}
