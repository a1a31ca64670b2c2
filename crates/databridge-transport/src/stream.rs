//! A [`Connection`] over any tokio byte stream.

use std::future::Future;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, TransportError};

/// Most bytes handed out by one [`Connection::recv`].
pub(crate) const READ_CHUNK: usize = 64 * 1024;

/// The read half plus a scratch buffer reused across reads.
struct Reader<S> {
    half: ReadHalf<S>,
    scratch: Vec<u8>,
}

/// A connection over a split byte stream.
///
/// The read and write halves sit behind separate locks, so a session can
/// wait for the next inbound chunk while its writer task is flushing
/// responses.
pub struct StreamConnection<S> {
    id: ConnectionId,
    peer: String,
    reader: Mutex<Reader<S>>,
    writer: Mutex<WriteHalf<S>>,
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps an accepted stream, assigning it a fresh [`ConnectionId`].
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            id: ConnectionId::next(),
            peer: peer.into(),
            reader: Mutex::new(Reader {
                half: reader,
                scratch: Vec::with_capacity(READ_CHUNK),
            }),
            writer: Mutex::new(writer),
        }
    }
}

impl<S> Connection for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            let mut writer = self.writer.lock().await;
            writer
                .write_all(data)
                .await
                .map_err(TransportError::SendFailed)?;
            writer.flush().await.map_err(TransportError::SendFailed)
        }
    }

    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send
    {
        async move {
            let mut reader = self.reader.lock().await;
            let Reader { half, scratch } = &mut *reader;
            scratch.clear();
            let n = half
                .take(READ_CHUNK as u64)
                .read_buf(scratch)
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                return Ok(None);
            }
            Ok(Some(scratch.to_vec()))
        }
    }

    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send {
        async move {
            self.writer
                .lock()
                .await
                .shutdown()
                .await
                .map_err(TransportError::SendFailed)
        }
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> &str {
        &self.peer
    }
}
