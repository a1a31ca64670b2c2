//! Integration tests for the DataBridge server, session driver, and full
//! request/response flow over real TCP connections.

use std::net::SocketAddr;
use std::time::Duration;

use databridge::prelude::*;
use databridge::protocol::{encode_frame, FrameDecoder, JsonCodec, MessageKind};
use databridge::SESSION_REFUSED_TOPIC;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Test commands
// =========================================================================

/// Sleeps for `ms` (default 200) and reports it.
fn slow_command() -> CommandSpec {
    CommandSpec::new("slow", |_ctx, args| async move {
        let ms = args.i64("ms").unwrap_or(200);
        tokio::time::sleep(Duration::from_millis(ms as u64)).await;
        Ok(Map::new().with("slept_ms", ms).into())
    })
    .optional("ms", ArgKind::Integer, "Milliseconds to sleep")
}

/// Returns its `tag` argument.
fn echo_command() -> CommandSpec {
    CommandSpec::new("echo", |ctx, args| async move {
        Ok(Map::new()
            .with("tag", args.required_str("tag")?)
            .with("session_id", ctx.session_id().to_string())
            .into())
    })
    .required("tag", ArgKind::String, "Value to echo")
}

/// Returns `size` bytes of filler text.
fn blob_command() -> CommandSpec {
    CommandSpec::new("blob", |_ctx, args| async move {
        let size = args.i64("size").unwrap_or(1024).max(0) as usize;
        Ok(Map::new().with("data", "x".repeat(size)).into())
    })
    .optional("size", ArgKind::Integer, "Bytes of filler")
}

fn panic_command() -> CommandSpec {
    CommandSpec::new("explode", |_ctx, args| async move {
        if args.get("defuse").is_none() {
            panic!("handler bug");
        }
        Ok(StructuredValue::Null)
    })
}

// =========================================================================
// Helpers
// =========================================================================

struct TestServer {
    addr: SocketAddr,
    stop: ShutdownHandle,
    task: JoinHandle<Result<(), BridgeError>>,
}

impl TestServer {
    async fn stop(self) {
        self.stop.stop();
        let result = tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server should stop in time")
            .expect("server task should not panic");
        assert!(result.is_ok());
    }
}

fn builder() -> BridgeServerBuilder {
    BridgeServer::builder()
        .bind("127.0.0.1:0")
        .command(slow_command())
        .command(echo_command())
        .command(panic_command())
        .command(blob_command())
}

/// Starts a server on a random port.
async fn start(builder: BridgeServerBuilder) -> TestServer {
    let server = builder
        .build(MemoryEngine::sample())
        .await
        .expect("server should build");
    let addr = server.local_addr();
    let stop = server.shutdown_handle();
    let task = tokio::spawn(server.run());
    TestServer { addr, stop, task }
}

/// A raw length-prefixed client.
struct Client {
    stream: TcpStream,
    decoder: FrameDecoder,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.expect("should connect"),
            decoder: FrameDecoder::new(Framing::LengthPrefixed),
        }
    }

    async fn send(&mut self, message: &Message) {
        let frame = encode_frame(&JsonCodec, Framing::LengthPrefixed, message).unwrap();
        self.stream.write_all(&frame).await.unwrap();
    }

    async fn send_request(&mut self, id: impl Into<MessageId>, command: &str, payload: Value) {
        self.send(&Message::request(id, command, payload)).await;
    }

    /// Sends a frame whose body is `body` verbatim.
    async fn send_body(&mut self, body: &[u8]) {
        let mut frame = (body.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(body);
        self.stream.write_all(&frame).await.unwrap();
    }

    /// Next message, or `None` once the server closed the connection.
    async fn recv(&mut self) -> Option<Message> {
        loop {
            if let Some(message) = self.decoder.next_message().expect("valid frame") {
                return Some(message);
            }
            let mut buf = [0u8; 8192];
            let n = tokio::time::timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for the server")
                .unwrap_or(0);
            if n == 0 {
                return None;
            }
            self.decoder.push(&buf[..n]);
        }
    }

    async fn expect(&mut self) -> Message {
        self.recv().await.expect("connection closed unexpectedly")
    }

    async fn call(&mut self, id: i64, command: &str, payload: Value) -> Message {
        self.send_request(id, command, payload).await;
        let reply = self.expect().await;
        assert_eq!(reply.id, MessageId::Number(id));
        reply
    }
}

fn payload(message: &Message) -> Value {
    message.payload.clone().into()
}

fn error_kind(message: &Message) -> Option<ErrorKind> {
    message.error.as_ref().map(|e| e.kind)
}

// =========================================================================
// Request / response
// =========================================================================

#[tokio::test]
async fn test_list_assets_request_gets_matching_response() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client.call(1, "list_assets", json!({"path": "/Game"})).await;
    assert_eq!(reply.kind, MessageKind::Response);
    assert!(reply.error.is_none());
    assert_eq!(payload(&reply)["assets"].as_array().unwrap().len(), 3);
    assert!(reply.timing_ms.is_some());

    server.stop().await;
}

#[tokio::test]
async fn test_missing_required_field_is_invalid_arguments() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client.call(2, "list_assets", json!({})).await;
    let error = reply.error.expect("should be an error");
    assert_eq!(error.kind, ErrorKind::InvalidArguments);
    assert_eq!(error.message, "missing field 'path'");

    server.stop().await;
}

#[tokio::test]
async fn test_unknown_command_keeps_session_open() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client.call(1, "teleport", json!({})).await;
    assert_eq!(error_kind(&reply), Some(ErrorKind::UnknownCommand));

    let reply = client.call(2, "ping", Value::Null).await;
    assert_eq!(payload(&reply)["message"], "pong");

    server.stop().await;
}

#[tokio::test]
async fn test_string_ids_are_echoed_verbatim() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    client.send_request("req-a", "ping", Value::Null).await;
    let reply = client.expect().await;
    assert_eq!(reply.id, MessageId::from("req-a"));

    server.stop().await;
}

#[tokio::test]
async fn test_hello_reports_session_and_token() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client.call(1, "hello", Value::Null).await;
    let body = payload(&reply);
    assert!(body["session_id"].as_str().unwrap().starts_with("S-"));
    assert_eq!(body["session_token"].as_str().unwrap().len(), 32);
    assert_eq!(body["protocol_version"], "1.0");

    server.stop().await;
}

#[tokio::test]
async fn test_set_then_get_property_round_trips() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client
        .call(
            1,
            "set_property",
            json!({"path": "/Game/Items/DA_Shield", "property": "Stats.Damage", "value": 7.5}),
        )
        .await;
    assert!(reply.error.is_none(), "{:?}", reply.error);

    let reply = client
        .call(
            2,
            "get_property",
            json!({"path": "/Game/Items/DA_Shield", "property": "Stats.Damage"}),
        )
        .await;
    assert_eq!(payload(&reply)["value"], 7.5);

    server.stop().await;
}

#[tokio::test]
async fn test_locked_asset_is_engine_rejected_with_details() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client
        .call(
            1,
            "set_property",
            json!({"path": "/Game/Core/DA_GameRules", "property": "FriendlyFire", "value": true}),
        )
        .await;
    let error = reply.error.expect("should be rejected");
    assert_eq!(error.kind, ErrorKind::EngineRejected);
    let details: Value = error.details.expect("details").into();
    assert_eq!(details["reason"], "locked");

    server.stop().await;
}

// =========================================================================
// Concurrency and correlation
// =========================================================================

#[tokio::test]
async fn test_responses_complete_out_of_order_by_id() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    client.send_request(1, "slow", json!({"ms": 300})).await;
    client.send_request(2, "ping", Value::Null).await;

    let first = client.expect().await;
    let second = client.expect().await;
    assert_eq!(first.id, MessageId::Number(2));
    assert_eq!(second.id, MessageId::Number(1));
    assert_eq!(payload(&second)["slept_ms"], 300);

    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_in_flight_id_is_rejected_without_losing_original() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    client.send_request(7, "slow", json!({"ms": 300})).await;
    client.send_request(7, "ping", Value::Null).await;

    let duplicate = client.expect().await;
    assert_eq!(duplicate.id, MessageId::Number(7));
    assert_eq!(error_kind(&duplicate), Some(ErrorKind::DuplicateRequestId));

    let original = client.expect().await;
    assert_eq!(original.id, MessageId::Number(7));
    assert!(original.error.is_none());
    assert_eq!(payload(&original)["slept_ms"], 300);

    // Once answered, the id may be reused.
    let reply = client.call(7, "ping", Value::Null).await;
    assert!(reply.error.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_sessions_never_see_each_others_ids() {
    let server = start(builder()).await;

    async fn run_session(addr: SocketAddr, name: &'static str) {
        let mut client = Client::connect(addr).await;
        for i in 0..50 {
            let tag = format!("{name}-{i}");
            let reply = client.call(i, "echo", json!({ "tag": tag })).await;
            assert_eq!(payload(&reply)["tag"], tag);
        }
    }

    tokio::join!(
        run_session(server.addr, "A"),
        run_session(server.addr, "B")
    );

    server.stop().await;
}

#[tokio::test]
async fn test_in_flight_limit_yields_overloaded() {
    let server = start(builder().max_in_flight(1)).await;
    let mut client = Client::connect(server.addr).await;

    client.send_request(1, "slow", json!({"ms": 300})).await;
    client.send_request(2, "ping", Value::Null).await;

    let rejected = client.expect().await;
    assert_eq!(rejected.id, MessageId::Number(2));
    assert_eq!(error_kind(&rejected), Some(ErrorKind::Overloaded));

    let finished = client.expect().await;
    assert_eq!(finished.id, MessageId::Number(1));
    assert!(finished.error.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_slow_handler_times_out() {
    let server = start(builder().request_timeout(Duration::from_millis(100))).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client.call(1, "slow", json!({"ms": 2000})).await;
    assert_eq!(error_kind(&reply), Some(ErrorKind::Timeout));

    let reply = client.call(2, "ping", Value::Null).await;
    assert!(reply.error.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_handler_panic_is_internal_error() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    let reply = client.call(1, "explode", Value::Null).await;
    assert_eq!(error_kind(&reply), Some(ErrorKind::Internal));

    let reply = client.call(2, "ping", Value::Null).await;
    assert_eq!(payload(&reply)["message"], "pong");

    server.stop().await;
}

#[tokio::test]
async fn test_disconnect_mid_flight_does_not_affect_others() {
    let server = start(builder()).await;

    let mut leaving = Client::connect(server.addr).await;
    leaving.send_request(5, "slow", json!({"ms": 200})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(leaving);

    let mut staying = Client::connect(server.addr).await;
    let reply = staying.call(1, "slow", json!({"ms": 300})).await;
    assert!(reply.error.is_none());
    let reply = staying.call(2, "ping", Value::Null).await;
    assert!(reply.error.is_none());

    server.stop().await;
}

// =========================================================================
// Protocol errors
// =========================================================================

#[tokio::test]
async fn test_malformed_frame_closes_only_that_session() {
    let server = start(builder()).await;
    let mut healthy = Client::connect(server.addr).await;
    let mut broken = Client::connect(server.addr).await;

    healthy.send_request(1, "slow", json!({"ms": 300})).await;
    broken.send_body(br#"{"id": 3, "kind": "request", "command": 42}"#).await;

    let error = broken.expect().await;
    assert_eq!(error.id, MessageId::Number(3));
    assert_eq!(error_kind(&error), Some(ErrorKind::Protocol));
    assert!(broken.recv().await.is_none(), "broken session should close");

    let reply = healthy.expect().await;
    assert_eq!(reply.id, MessageId::Number(1));
    assert!(reply.error.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_unreadable_frame_closes_without_reply() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    client.send_body(b"not json at all").await;
    assert!(client.recv().await.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_client_sent_response_is_protocol_error() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    client
        .send(&Message::response(MessageId::Number(9), StructuredValue::Null))
        .await;
    let error = client.expect().await;
    assert_eq!(error.id, MessageId::Number(9));
    assert_eq!(error_kind(&error), Some(ErrorKind::Protocol));
    assert!(client.recv().await.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_oversized_frame_is_protocol_error() {
    let server = start(builder().max_frame_bytes(64)).await;
    let mut client = Client::connect(server.addr).await;

    let tag = "x".repeat(200);
    client.send_request(1, "echo", json!({ "tag": tag })).await;
    assert!(client.recv().await.is_none());

    server.stop().await;
}

// =========================================================================
// Server behavior
// =========================================================================

#[tokio::test]
async fn test_session_limit_refuses_extra_connection() {
    let server = start(builder().max_sessions(1)).await;

    let mut first = Client::connect(server.addr).await;
    let reply = first.call(1, "ping", Value::Null).await;
    assert!(reply.error.is_none());

    let mut second = Client::connect(server.addr).await;
    let refusal = second.expect().await;
    assert_eq!(refusal.kind, MessageKind::Event);
    let body = payload(&refusal);
    assert_eq!(body["topic"], SESSION_REFUSED_TOPIC);
    assert_eq!(body["kind"], "Overloaded");
    assert!(second.recv().await.is_none());

    // The existing session is unaffected.
    let reply = first.call(2, "ping", Value::Null).await;
    assert!(reply.error.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_reconnect_after_disconnect_at_capacity_is_accepted() {
    let server = start(builder().max_sessions(1)).await;

    for round in 0..20 {
        let mut client = Client::connect(server.addr).await;
        let reply = client.call(round, "ping", Value::Null).await;
        assert_eq!(reply.kind, MessageKind::Response, "round {round}");

        // Half-close, then wait for the server to close its side.
        client.stream.shutdown().await.unwrap();
        assert!(client.recv().await.is_none());
    }

    server.stop().await;
}

#[tokio::test]
async fn test_client_that_never_reads_is_closed_and_frees_its_slot() {
    let server = start(
        builder()
            .max_sessions(1)
            .max_queued_messages(2)
            .send_timeout(Duration::from_millis(200))
            .drain_grace(Duration::from_millis(200)),
    )
    .await;

    // 64 MiB of responses: far more than the socket buffers hold.
    let mut hoarder = Client::connect(server.addr).await;
    for i in 0..64 {
        hoarder
            .send_request(i, "blob", json!({"size": 1 << 20}))
            .await;
    }

    // A refused connection is told so at once; an accepted one hears
    // nothing until it asks.
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let mut next = Client::connect(server.addr).await;
        match tokio::time::timeout(Duration::from_millis(300), next.recv()).await {
            Err(_) => {
                let reply = next.call(1, "ping", Value::Null).await;
                assert_eq!(payload(&reply)["message"], "pong");
                break;
            }
            Ok(refusal) => {
                let refusal = refusal.expect("a refusal event");
                assert_eq!(payload(&refusal)["topic"], SESSION_REFUSED_TOPIC);
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "backlogged session was never closed"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    drop(hoarder);
    server.stop().await;
}

#[tokio::test]
async fn test_change_events_reach_subscribers_only() {
    let server = start(builder()).await;
    let mut watcher = Client::connect(server.addr).await;
    let mut editor = Client::connect(server.addr).await;

    let reply = watcher
        .call(1, "subscribe", json!({"topics": ["actor"]}))
        .await;
    assert_eq!(payload(&reply)["topics"], json!(["actor"]));

    let reply = editor
        .call(
            1,
            "set_actor_property",
            json!({"actor": "BP_Torch_2", "property": "Hidden", "value": true}),
        )
        .await;
    assert!(reply.error.is_none());

    let event = watcher.expect().await;
    assert_eq!(event.kind, MessageKind::Event);
    assert_eq!(event.id, MessageId::from("evt-1"));
    let body = payload(&event);
    assert_eq!(body["topic"], "actor");
    assert_eq!(body["change"], "modified");
    assert!(body["path"].as_str().unwrap().ends_with("BP_Torch_2"));

    // The editor never subscribed; its next message is its own response.
    let reply = editor.call(2, "ping", Value::Null).await;
    assert_eq!(reply.kind, MessageKind::Response);

    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_request_finish() {
    let server = start(builder()).await;
    let mut client = Client::connect(server.addr).await;

    client.send_request(1, "slow", json!({"ms": 200})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let addr = server.addr;
    server.stop().await;

    let reply = client.expect().await;
    assert_eq!(reply.id, MessageId::Number(1));
    assert!(reply.error.is_none());
    assert!(client.recv().await.is_none());

    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_duplicate_host_command_fails_build() {
    let result = BridgeServer::builder()
        .bind("127.0.0.1:0")
        .command(CommandSpec::new("ping", |_ctx, _args| async {
            Ok(StructuredValue::Null)
        }))
        .build(MemoryEngine::sample())
        .await;
    assert!(matches!(result, Err(BridgeError::Registry(_))));
}

#[tokio::test]
async fn test_invalid_config_fails_build() {
    let result = BridgeServer::builder()
        .bind("127.0.0.1:0")
        .max_sessions(0)
        .build(MemoryEngine::sample())
        .await;
    assert!(matches!(result, Err(BridgeError::Config(_))));
}

#[tokio::test]
async fn test_line_delimited_framing() {
    let server = start(builder().framing(Framing::LineDelimited)).await;
    let stream = TcpStream::connect(server.addr).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    write
        .write_all(b"{\"id\":\"a\",\"kind\":\"request\",\"command\":\"ping\"}\n\n")
        .await
        .unwrap();
    let line = tokio::time::timeout(WAIT, lines.next_line())
        .await
        .unwrap()
        .unwrap()
        .expect("a response line");
    let reply: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["id"], "a");
    assert_eq!(reply["kind"], "response");
    assert_eq!(reply["payload"]["message"], "pong");

    server.stop().await;
}
