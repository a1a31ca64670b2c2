//! Per-connection driver: one session from accept to close.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Register in the session table (or refuse when full)
//!   2. Loop: read frames → dispatch requests concurrently, forward
//!      completed responses and pushed events to the writer task
//!   3. Drain: stop reading, give in-flight handlers a grace period
//!   4. Close: abort stragglers, flush the writer, leave the table, then
//!      close the socket
//!
//! Outbound messages go through a bounded queue. When the peer stops
//! reading and the queue stays full for `send_timeout`, the session is
//! closed instead of buffering without limit.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use databridge_commands::CommandContext;
use databridge_protocol::{
    encode_frame, ErrorInfo, ErrorKind, FrameDecoder, Framing, JsonCodec, Map,
    Message, MessageId, ProtocolError, StructuredValue,
};
use databridge_session::{Outbound, Session, SessionError, SessionId, SessionState};
use databridge_transport::Connection;
use futures_util::FutureExt;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch};

use crate::server::{stopped, ServerState};
use crate::BridgeError;

/// Params longer than this are cut in command logs.
const LOG_PARAMS_MAX: usize = 200;

/// Topic of the event sent to a connection refused at the session limit.
pub const SESSION_REFUSED_TOPIC: &str = "session_refused";

/// What a request task reports back to the driver.
struct Completion {
    id: MessageId,
    command: String,
    outcome: Result<StructuredValue, ErrorInfo>,
    elapsed: Duration,
}

/// Removes the session from the table.
///
/// The normal path is [`release`](Self::release), awaited before the socket
/// is closed, so a client that sees the close can reconnect into the freed
/// slot. If the handler unwinds instead, `Drop` removes the entry from a
/// spawned task.
struct SessionGuard {
    id: SessionId,
    state: Arc<ServerState>,
    armed: bool,
}

impl SessionGuard {
    async fn release(mut self) {
        self.state.sessions.lock().await.close(self.id);
        self.armed = false;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id;
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            state.sessions.lock().await.close(id);
        });
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Connection>(
    conn: C,
    state: Arc<ServerState>,
    stop: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    tracing::debug!(%conn_id, peer = conn.peer(), "handling new connection");

    let queue_capacity = state.config.max_queued_messages;
    let (events_tx, events_rx) = mpsc::channel(queue_capacity);
    let opened = state.sessions.lock().await.open(events_tx);
    let opened = match opened {
        Ok(opened) => opened,
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "refusing connection");
            refuse(conn.as_ref(), state.config.framing, &ErrorInfo::from(&e)).await;
            return Err(e.into());
        }
    };
    let guard = SessionGuard {
        id: opened.id,
        state: Arc::clone(&state),
        armed: true,
    };

    let session = Session::new(
        opened.id,
        opened.token,
        opened.subscriptions,
        &state.config.session_config(),
    );
    let ctx = CommandContext::new(
        session.id(),
        session.token(),
        state.engine.clone(),
        session.subscriptions().clone(),
        Arc::clone(&state.registry),
    );

    let (writer_tx, writer_rx) = mpsc::channel(queue_capacity);
    let mut writer = tokio::spawn(write_loop(
        Arc::clone(&conn),
        writer_rx,
        state.config.framing,
        session.id(),
    ));
    // Holds at most `max_in_flight` completions.
    let (done_tx, done_rx) = mpsc::unbounded_channel();

    let mut driver = SessionDriver {
        session,
        ctx,
        state: Arc::clone(&state),
        writer: writer_tx,
        done_tx,
        backlogged: false,
    };
    let result = driver.run(conn.as_ref(), events_rx, done_rx, stop).await;

    // Closing the writer channel lets the writer flush what is queued. A
    // peer that stopped reading gets no flush.
    let SessionDriver {
        session,
        writer: writer_tx,
        backlogged,
        ..
    } = driver;
    drop(writer_tx);
    let grace = state.config.session_config().drain_grace;
    if backlogged || tokio::time::timeout(grace, &mut writer).await.is_err() {
        tracing::debug!(session_id = %session.id(), "writer did not flush, discarding output");
        writer.abort();
        let _ = writer.await;
    }

    guard.release().await;
    if let Err(e) = conn.close().await {
        tracing::debug!(session_id = %session.id(), error = %e, "close failed");
    }
    tracing::info!(
        session_id = %session.id(),
        %conn_id,
        age_ms = session.age().as_millis() as u64,
        "session ended"
    );
    result
}

/// Tells a connection over the session limit why it is being closed.
async fn refuse<C: Connection>(conn: &C, framing: Framing, error: &ErrorInfo) {
    let payload = Map::new()
        .with("topic", SESSION_REFUSED_TOPIC)
        .with("kind", ErrorKind::Overloaded.as_str())
        .with("message", error.message.clone());
    let event = Message::event(MessageId::from("evt-1"), payload.into());
    match encode_frame(&JsonCodec, framing, &event) {
        Ok(frame) => {
            if let Err(e) = conn.send(&frame).await {
                tracing::debug!(error = %e, "failed to send refusal");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to encode refusal"),
    }
    let _ = conn.close().await;
}

/// Writes queued messages in order until the channel closes or the peer
/// stops reading.
async fn write_loop<C: Connection>(
    conn: Arc<C>,
    mut queue: mpsc::Receiver<Message>,
    framing: Framing,
    session_id: SessionId,
) {
    while let Some(message) = queue.recv().await {
        let frame = match encode_frame(&JsonCodec, framing, &message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(%session_id, id = %message.id, error = %e, "failed to encode message");
                continue;
            }
        };
        if let Err(e) = conn.send(&frame).await {
            tracing::debug!(%session_id, error = %e, "send failed, discarding output");
            break;
        }
    }
}

/// Owns one session's state while its connection is open.
struct SessionDriver {
    session: Session,
    ctx: CommandContext,
    state: Arc<ServerState>,
    writer: mpsc::Sender<Message>,
    done_tx: mpsc::UnboundedSender<Completion>,
    /// Set once the outbound queue stayed full past the send timeout.
    backlogged: bool,
}

impl SessionDriver {
    fn id(&self) -> SessionId {
        self.session.id()
    }

    async fn run<C: Connection>(
        &mut self,
        conn: &C,
        mut events: mpsc::Receiver<Outbound>,
        mut done: mpsc::UnboundedReceiver<Completion>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), BridgeError> {
        let mut decoder = FrameDecoder::new(self.state.config.framing)
            .max_frame_len(self.state.config.max_frame_bytes);
        let mut failure = None;

        loop {
            tokio::select! {
                _ = stopped(&mut stop) => {
                    tracing::info!(session_id = %self.id(), "server stopping, draining session");
                    break;
                }
                Some(completion) = done.recv() => self.finish(completion).await,
                Some(outbound) = events.recv() => self.forward(outbound).await,
                read = conn.recv() => match read {
                    Ok(Some(bytes)) => {
                        decoder.push(&bytes);
                        if let Err(e) = self.drain_frames(&mut decoder).await {
                            failure = Some(e);
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::debug!(session_id = %self.id(), "peer closed connection");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(session_id = %self.id(), error = %e, "recv error");
                        failure = Some(e.into());
                        break;
                    }
                },
            }

            if self.backlogged {
                let capacity = self.state.config.max_queued_messages;
                failure = Some(SessionError::Backlogged { capacity }.into());
                break;
            }
        }

        self.drain(&mut done).await;
        failure.map_or(Ok(()), Err)
    }

    /// Handles every complete frame in the decoder.
    async fn drain_frames(&mut self, decoder: &mut FrameDecoder) -> Result<(), BridgeError> {
        while !self.backlogged {
            let message = match decoder.next_message() {
                Ok(Some(message)) => message,
                Ok(None) => return Ok(()),
                Err(e) => {
                    let id = e.salvaged_id().cloned();
                    self.protocol_failure(id, &e).await;
                    return Err(e.into());
                }
            };
            let id = message.id.clone();
            let request = match message.into_request() {
                Ok(request) => request,
                Err(e) => {
                    self.protocol_failure(Some(id), &e).await;
                    return Err(e.into());
                }
            };
            if self.session.activate() {
                self.mirror_state(SessionState::Active).await;
            }
            self.dispatch(request.id, request.command, request.payload)
                .await;
        }
        Ok(())
    }

    /// Reports a session-fatal protocol error, when the client can be told
    /// which request caused it.
    async fn protocol_failure(&mut self, id: Option<MessageId>, error: &ProtocolError) {
        tracing::warn!(session_id = %self.id(), error = %error, "protocol error, closing session");
        if let Some(id) = id {
            let info = ErrorInfo::new(ErrorKind::Protocol, error.to_string());
            self.send(Message::error_response(id, info)).await;
        }
    }

    /// Registers the request and starts its handler. Failures that need no
    /// handler are answered right away.
    async fn dispatch(&mut self, id: MessageId, command: String, payload: StructuredValue) {
        if self.state.config.log_commands {
            tracing::info!(
                session_id = %self.id(),
                "<- {command} {}",
                truncate(&payload.to_string(), LOG_PARAMS_MAX)
            );
        } else {
            tracing::debug!(session_id = %self.id(), %id, %command, "request received");
        }

        if let Err(e) = self.session.begin_request(&id, &command) {
            self.reply_now(id, &command, ErrorInfo::from(&e)).await;
            return;
        }

        let handler = match self
            .state
            .registry
            .prepare(self.ctx.clone(), &command, payload)
        {
            Ok(handler) => handler,
            Err(e) => {
                self.session.in_flight_mut().complete(&id);
                self.reply_now(id, &command, ErrorInfo::from(&e)).await;
                return;
            }
        };

        let timeout = self.state.config.request_timeout();
        let done_tx = self.done_tx.clone();
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(
                timeout,
                AssertUnwindSafe(handler).catch_unwind(),
            )
            .await
            {
                Ok(Ok(result)) => result.map_err(|e| ErrorInfo::from(&e)),
                Ok(Err(_)) => {
                    tracing::error!(command = %command, "command handler panicked");
                    Err(ErrorInfo::new(
                        ErrorKind::Internal,
                        format!("command '{command}' panicked"),
                    ))
                }
                Err(_) => Err(ErrorInfo::new(
                    ErrorKind::Timeout,
                    format!(
                        "command '{command}' timed out after {} ms",
                        timeout.as_millis()
                    ),
                )),
            };
            // The driver is gone once the session closed; the result is
            // discarded with it.
            let _ = done_tx.send(Completion {
                id: task_id,
                command,
                outcome,
                elapsed: started.elapsed(),
            });
        });
        self.session
            .in_flight_mut()
            .attach(&id, task.abort_handle());
    }

    /// Answers a request that never reached a handler.
    async fn reply_now(&mut self, id: MessageId, command: &str, error: ErrorInfo) {
        self.log_outcome(command, &Err(error.clone()), Duration::ZERO);
        self.send(Message::error_response(id, error).with_timing(0.0))
            .await;
    }

    /// Turns a finished handler into its response, if one is still owed.
    async fn finish(&mut self, completion: Completion) {
        let Completion {
            id,
            command,
            outcome,
            elapsed,
        } = completion;
        if self.session.in_flight_mut().complete(&id).is_none() {
            tracing::debug!(session_id = %self.id(), %id, "late result discarded");
            return;
        }

        self.log_outcome(&command, &outcome, elapsed);
        if elapsed >= self.state.config.slow_command_threshold() {
            tracing::warn!(
                session_id = %self.id(),
                %command,
                elapsed_ms = elapsed.as_millis() as u64,
                "slow command"
            );
        }

        let message = match outcome {
            Ok(payload) => Message::response(id, payload),
            Err(error) => Message::error_response(id, error),
        };
        self.send(message.with_timing(elapsed.as_secs_f64() * 1000.0))
            .await;
    }

    fn log_outcome(
        &self,
        command: &str,
        outcome: &Result<StructuredValue, ErrorInfo>,
        elapsed: Duration,
    ) {
        if !self.state.config.log_commands {
            return;
        }
        let ms = elapsed.as_secs_f64() * 1000.0;
        match outcome {
            Ok(payload) => match payload.get("count").and_then(StructuredValue::as_u64) {
                Some(count) => tracing::info!(
                    session_id = %self.id(),
                    "-> {command} SUCCESS ({ms:.1} ms, {count} results)"
                ),
                None => tracing::info!(
                    session_id = %self.id(),
                    "-> {command} SUCCESS ({ms:.1} ms)"
                ),
            },
            Err(error) => tracing::info!(
                session_id = %self.id(),
                "-> {command} ERROR {} ({ms:.1} ms): {}",
                error.kind,
                error.message
            ),
        }
    }

    /// Puts a pushed event on the wire with this session's next event id.
    async fn forward(&mut self, outbound: Outbound) {
        match outbound {
            Outbound::Message(message) => self.send(message).await,
            Outbound::Event { topic, payload } => {
                let id = self.session.next_event_id();
                tracing::debug!(session_id = %self.id(), %id, %topic, "pushing event");
                self.send(Message::event(id, payload)).await;
            }
        }
    }

    /// Queues a message for the writer, waiting at most `send_timeout` for
    /// room. Once that wait has expired the session is backlogged and
    /// further output is dropped.
    async fn send(&mut self, message: Message) {
        if self.backlogged {
            return;
        }
        let timeout = self.state.config.send_timeout();
        match self.writer.send_timeout(message, timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(message)) => {
                tracing::warn!(
                    session_id = %self.id(),
                    id = %message.id,
                    queued = self.state.config.max_queued_messages,
                    "peer is not reading, closing session"
                );
                self.backlogged = true;
            }
            Err(SendTimeoutError::Closed(_)) => {
                tracing::debug!(session_id = %self.id(), "writer gone, dropping message");
            }
        }
    }

    async fn mirror_state(&self, target: SessionState) {
        let result = self.state.sessions.lock().await.set_state(self.id(), target);
        if let Err(e) = result {
            tracing::debug!(session_id = %self.id(), error = %e, "session table out of sync");
        }
    }

    /// Stops accepting requests and waits up to the drain grace for
    /// in-flight handlers; whatever is still running then is aborted.
    async fn drain(&mut self, done: &mut mpsc::UnboundedReceiver<Completion>) {
        if self.session.transition(SessionState::Draining).is_ok() {
            self.mirror_state(SessionState::Draining).await;
        }

        let deadline = tokio::time::Instant::now()
            + self.state.config.session_config().drain_grace;
        while !self.session.in_flight().is_empty() {
            if self.backlogged {
                let abandoned = self.session.in_flight_mut().abort_all();
                tracing::debug!(session_id = %self.id(), abandoned, "dropping requests of backlogged session");
                break;
            }
            match tokio::time::timeout_at(deadline, done.recv()).await {
                Ok(Some(completion)) => self.finish(completion).await,
                Ok(None) => break,
                Err(_) => {
                    let abandoned = self.session.in_flight_mut().abort_all();
                    tracing::warn!(
                        session_id = %self.id(),
                        abandoned,
                        "drain grace elapsed, abandoning requests"
                    );
                    break;
                }
            }
        }

        if let Err(e) = self.session.transition(SessionState::Closed) {
            tracing::debug!(session_id = %self.id(), error = %e, "close transition refused");
        }
    }
}

/// Cuts `text` to at most `max` bytes on a character boundary.
fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_unchanged() {
        assert_eq!(truncate("{\"path\":\"/Game\"}", 200), "{\"path\":\"/Game\"}");
    }

    #[test]
    fn test_truncate_long_text_cut_with_ellipsis() {
        let text = "x".repeat(250);
        let cut = truncate(&text, LOG_PARAMS_MAX);
        assert_eq!(cut.len(), LOG_PARAMS_MAX + 3);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let cut = truncate("ééé", 3);
        assert_eq!(cut, "é...");
    }
}
