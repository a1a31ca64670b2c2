//! Integration tests for the stream transports.
//!
//! These spin up a real listener and a raw tokio client to verify that
//! bytes actually flow over the socket in both directions.

use databridge_transport::{Connection, TcpTransport, Transport, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn test_tcp_accept_and_send_receive() {
    // Port 0: let the OS pick, then read the real address back.
    let mut transport = TcpTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr();

    let server_handle = tokio::spawn(async move {
        let conn = transport.accept().await.expect("should accept");
        (transport, conn)
    });

    let mut client = TcpStream::connect(addr).await.expect("should connect");
    let (_transport, server_conn) =
        server_handle.await.expect("task should complete");

    assert!(server_conn.id().into_inner() > 0);
    assert!(!server_conn.peer().is_empty());

    // --- Server sends, client receives ---
    server_conn
        .send(b"hello from server")
        .await
        .expect("send should succeed");
    let mut buf = [0u8; 17];
    client.read_exact(&mut buf).await.expect("client read");
    assert_eq!(&buf, b"hello from server");

    // --- Client sends, server receives ---
    client.write_all(b"hello from client").await.unwrap();
    let mut received = Vec::new();
    while received.len() < 17 {
        let chunk = server_conn
            .recv()
            .await
            .expect("recv should succeed")
            .expect("should not be closed");
        received.extend(chunk);
    }
    assert_eq!(received, b"hello from client");
}

#[tokio::test]
async fn test_tcp_recv_large_payload_arrives_in_bounded_chunks() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr();
    let accept = tokio::spawn(async move { transport.accept().await });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let server_conn = accept.await.unwrap().unwrap();

    let payload: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
    let writer = tokio::spawn(async move {
        client.write_all(&payload).await.unwrap();
        payload
    });

    let mut received = Vec::new();
    while received.len() < 300_000 {
        let chunk = server_conn.recv().await.unwrap().expect("still open");
        assert!(!chunk.is_empty());
        assert!(chunk.len() <= 64 * 1024);
        received.extend(chunk);
    }
    assert_eq!(received, writer.await.unwrap());
}

#[tokio::test]
async fn test_tcp_recv_after_client_close_returns_none() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr();
    let accept = tokio::spawn(async move { transport.accept().await });

    let client = TcpStream::connect(addr).await.unwrap();
    let server_conn = accept.await.unwrap().unwrap();
    drop(client);

    let result = server_conn.recv().await.expect("clean close is not an error");
    assert!(result.is_none());
}

#[tokio::test]
async fn test_tcp_accept_after_shutdown_returns_shutdown() {
    let mut transport = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    transport.shutdown().await.unwrap();
    let result = transport.accept().await;
    assert!(matches!(result, Err(TransportError::Shutdown)));
}

#[tokio::test]
async fn test_tcp_bind_in_use_address_returns_bind_failed() {
    let first = TcpTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = first.local_addr().to_string();
    let second = TcpTransport::bind(&addr).await;
    assert!(matches!(second, Err(TransportError::BindFailed { .. })));
}

#[cfg(unix)]
mod unix {
    use databridge_transport::{Connection, Transport, TransportError, UnixTransport};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    #[tokio::test]
    async fn test_unix_round_trip_and_cleanup() {
        let path = std::env::temp_dir()
            .join(format!("databridge-test-{}.sock", std::process::id()));
        let mut transport = UnixTransport::bind(&path).expect("should bind");

        let accept = tokio::spawn(async move {
            let conn = transport.accept().await.expect("should accept");
            (transport, conn)
        });
        let mut client = UnixStream::connect(&path).await.unwrap();
        let (mut transport, server_conn) = accept.await.unwrap();

        client.write_all(b"ping").await.unwrap();
        let chunk = server_conn.recv().await.unwrap().unwrap();
        assert_eq!(chunk, b"ping");

        server_conn.send(b"pong").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        transport.shutdown().await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unix_bind_replaces_stale_socket() {
        let path = std::env::temp_dir()
            .join(format!("databridge-stale-{}.sock", std::process::id()));
        let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(stale);
        assert!(path.exists());

        let mut transport = UnixTransport::bind(&path).expect("should replace stale socket");
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unix_bind_over_regular_file_fails_and_keeps_file() {
        let path = std::env::temp_dir()
            .join(format!("databridge-notes-{}.txt", std::process::id()));
        std::fs::write(&path, b"keep me").unwrap();

        let result = UnixTransport::bind(&path);
        assert!(matches!(result, Err(TransportError::BindFailed { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
        std::fs::remove_file(&path).unwrap();
    }
}
