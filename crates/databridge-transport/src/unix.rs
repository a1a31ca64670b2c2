//! Local-socket transport for Unix hosts.

use std::future::Future;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

use crate::{Connection, StreamConnection, Transport, TransportError};

/// A single Unix-domain socket connection.
pub type UnixConnection = StreamConnection<UnixStream>;

/// A [`Transport`] listening on a Unix-domain socket path.
///
/// The socket file is removed on [`shutdown`](Transport::shutdown).
pub struct UnixTransport {
    listener: Option<UnixListener>,
    path: PathBuf,
}

impl UnixTransport {
    /// Binds to `path`, replacing a stale socket file left by a previous
    /// run. Any other kind of file at `path` is left alone and the bind
    /// fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source| TransportError::BindFailed {
            addr: path.display().to_string(),
            source,
        };
        match std::fs::symlink_metadata(&path) {
            Ok(meta) if meta.file_type().is_socket() => {
                std::fs::remove_file(&path).map_err(bind_err)?;
            }
            Ok(_) => {
                return Err(bind_err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "path exists and is not a socket",
                )));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(bind_err(e)),
        }
        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        tracing::info!(path = %path.display(), "Unix transport listening");
        Ok(Self {
            listener: Some(listener),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for UnixTransport {
    type Connection = UnixConnection;

    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send
    {
        async move {
            let listener =
                self.listener.as_ref().ok_or(TransportError::Shutdown)?;
            let (stream, _addr) = listener
                .accept()
                .await
                .map_err(TransportError::AcceptFailed)?;
            let conn =
                StreamConnection::new(stream, self.path.display().to_string());
            tracing::debug!(id = %conn.id(), "accepted local connection");
            Ok(conn)
        }
    }

    fn shutdown(
        &mut self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            if self.listener.take().is_some() {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::debug!(error = %e, "failed to remove socket file");
                }
            }
            Ok(())
        }
    }

    fn local_description(&self) -> String {
        self.path.display().to_string()
    }
}
