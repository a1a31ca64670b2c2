//! TCP transport.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::{Connection, StreamConnection, Transport, TransportError};

/// A single TCP connection.
pub type TcpConnection = StreamConnection<TcpStream>;

/// A TCP [`Transport`] listening on a host:port.
pub struct TcpTransport {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    ///
    /// Use port `0` to let the OS pick a free port, then read it back with
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            }
        })?;
        let local_addr = listener.local_addr().map_err(|source| {
            TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(%local_addr, "TCP transport listening");
        Ok(Self {
            listener: Some(listener),
            local_addr,
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send
    {
        async move {
            let listener =
                self.listener.as_ref().ok_or(TransportError::Shutdown)?;
            let (stream, addr) = listener
                .accept()
                .await
                .map_err(TransportError::AcceptFailed)?;
            // Small request/response frames; don't wait to coalesce.
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "failed to set TCP_NODELAY");
            }
            let conn = StreamConnection::new(stream, addr.to_string());
            tracing::debug!(id = %conn.id(), %addr, "accepted TCP connection");
            Ok(conn)
        }
    }

    fn shutdown(
        &mut self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            if self.listener.take().is_some() {
                tracing::info!(
                    local_addr = %self.local_addr,
                    "TCP listener closed"
                );
            }
            Ok(())
        }
    }

    fn local_description(&self) -> String {
        self.local_addr.to_string()
    }
}
