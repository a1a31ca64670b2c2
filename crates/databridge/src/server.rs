//! `BridgeServer` builder and server loop.
//!
//! This is the entry point for running a DataBridge server. It ties
//! together all the layers: transport → protocol → session → commands →
//! engine context.

use std::sync::Arc;
use std::time::Duration;

use databridge_commands::{CommandRegistry, CommandSpec};
use databridge_engine::{ChangeNotice, EngineContext, EngineContextHandle, EngineFacade};
use databridge_protocol::Framing;
use databridge_session::SessionManager;
use databridge_transport::{TcpTransport, Transport, TransportError};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinSet;

use crate::handler::handle_connection;
use crate::{BridgeConfig, BridgeError};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The session
/// table is the only mutable part and sits behind a `Mutex`.
pub(crate) struct ServerState {
    pub(crate) sessions: Mutex<SessionManager>,
    pub(crate) registry: Arc<CommandRegistry>,
    pub(crate) engine: EngineContextHandle,
    pub(crate) config: BridgeConfig,
}

/// Builder for configuring and starting a DataBridge server.
///
/// # Example
///
/// ```rust,no_run
/// use databridge::prelude::*;
///
/// # async fn demo() -> Result<(), BridgeError> {
/// let server = BridgeServer::builder()
///     .bind("127.0.0.1:8742")
///     .log_commands(true)
///     .build(MemoryEngine::sample())
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct BridgeServerBuilder {
    config: BridgeConfig,
    commands: Vec<CommandSpec>,
}

impl BridgeServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: BridgeConfig::default(),
            commands: Vec::new(),
        }
    }

    /// Replaces every setting with `config`. Later builder calls still
    /// override single fields.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.listen_addr = addr.to_string();
        self
    }

    pub fn framing(mut self, framing: Framing) -> Self {
        self.config.framing = framing;
        self
    }

    pub fn max_frame_bytes(mut self, max: usize) -> Self {
        self.config.max_frame_bytes = max;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout_ms = millis(timeout);
        self
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    pub fn max_in_flight(mut self, max: usize) -> Self {
        self.config.max_in_flight = max;
        self
    }

    /// Bounds each session's outbound queue.
    pub fn max_queued_messages(mut self, max: usize) -> Self {
        self.config.max_queued_messages = max;
        self
    }

    /// How long a session may wait on a full outbound queue before it is
    /// closed.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout_ms = millis(timeout);
        self
    }

    pub fn drain_grace(mut self, grace: Duration) -> Self {
        self.config.drain_grace_ms = millis(grace);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace_ms = millis(grace);
        self
    }

    pub fn engine_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.engine_queue_capacity = capacity;
        self
    }

    /// Logs every command and its outcome at `info`.
    pub fn log_commands(mut self, enabled: bool) -> Self {
        self.config.log_commands = enabled;
        self
    }

    pub fn slow_command_warning(mut self, threshold: Duration) -> Self {
        self.config.slow_command_warn_ms = millis(threshold);
        self
    }

    /// Adds a host-specific command next to the built-in set.
    pub fn command(mut self, spec: CommandSpec) -> Self {
        self.commands.push(spec);
        self
    }

    /// Binds the TCP listener and starts the engine context on `facade`.
    ///
    /// # Errors
    /// - [`BridgeError::Config`] for unusable settings
    /// - [`BridgeError::Registry`] if a host command repeats a name
    /// - [`BridgeError::Transport`] if the address cannot be bound
    /// - [`BridgeError::Engine`] if the engine thread cannot start
    pub async fn build<F: EngineFacade>(
        self,
        facade: F,
    ) -> Result<BridgeServer<TcpTransport>, BridgeError> {
        self.config.validate()?;
        let transport = TcpTransport::bind(&self.config.listen_addr).await?;
        self.build_with_transport(transport, facade)
    }

    /// Like [`build`](Self::build), over an already-bound transport
    /// (e.g. a `UnixTransport`). `listen_addr` is ignored.
    ///
    /// # Errors
    /// As [`build`](Self::build), minus binding.
    pub fn build_with_transport<T: Transport, F: EngineFacade>(
        self,
        transport: T,
        facade: F,
    ) -> Result<BridgeServer<T>, BridgeError> {
        self.config.validate()?;

        let mut registry = CommandRegistry::with_builtins()?;
        for spec in self.commands {
            registry.register(spec)?;
        }

        let engine = EngineContext::start(facade, self.config.engine_queue_capacity)?;
        let state = Arc::new(ServerState {
            sessions: Mutex::new(SessionManager::new(self.config.max_sessions)),
            registry: Arc::new(registry),
            engine: engine.handle(),
            config: self.config,
        });
        let (stop_tx, _) = watch::channel(false);

        Ok(BridgeServer {
            transport,
            state,
            engine,
            shutdown: ShutdownHandle {
                sender: Arc::new(stop_tx),
            },
        })
    }
}

impl Default for BridgeServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Stops a running [`BridgeServer`] from anywhere.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Asks the server to stop: no new connections, sessions drain, then
    /// [`BridgeServer::run`] returns.
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Resolves once `stop` has been signalled.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    // A closed channel can never signal; treat it as stopped.
    let _ = stop.wait_for(|stopped| *stopped).await;
}

/// A DataBridge server, bound and ready.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BridgeServer<T: Transport = TcpTransport> {
    transport: T,
    state: Arc<ServerState>,
    engine: EngineContext,
    shutdown: ShutdownHandle,
}

impl BridgeServer<TcpTransport> {
    /// Creates a new builder.
    pub fn builder() -> BridgeServerBuilder {
        BridgeServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.transport.local_addr()
    }
}

impl<T: Transport> BridgeServer<T> {
    /// A handle that stops [`run`](Self::run).
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// The command set this server answers.
    pub fn registry(&self) -> &CommandRegistry {
        &self.state.registry
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.state.config
    }

    /// Runs the server until [`ShutdownHandle::stop`] is called.
    ///
    /// Spawns a session task per accepted connection. On stop, the
    /// listener is released, every session drains, and sessions still
    /// running after `shutdown_grace` are aborted. The engine context is
    /// stopped last.
    ///
    /// # Errors
    /// Currently always `Ok`; accept failures are logged and survived.
    pub async fn run(mut self) -> Result<(), BridgeError> {
        let mut stop = self.shutdown.subscribe();
        let fan_out = tokio::spawn(fan_out(
            self.state.engine.subscribe(),
            Arc::clone(&self.state),
        ));
        let mut sessions = JoinSet::new();

        tracing::info!(
            endpoint = %self.transport.local_description(),
            commands = self.state.registry.len(),
            "DataBridge server running"
        );

        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        let stop = self.shutdown.subscribe();
                        sessions.spawn(async move {
                            if let Err(e) = handle_connection(conn, state, stop).await {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(TransportError::Shutdown) => break,
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::warn!("session task panicked");
                        }
                    }
                }
            }
        }

        tracing::info!(live = sessions.len(), "DataBridge server stopping");
        if let Err(e) = self.transport.shutdown().await {
            tracing::warn!(error = %e, "failed to close listener");
        }

        let drained = tokio::time::timeout(self.state.config.shutdown_grace(), async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(
                remaining = sessions.len(),
                "shutdown grace elapsed, aborting sessions"
            );
            sessions.shutdown().await;
        }

        fan_out.abort();
        self.engine.shutdown().await;
        tracing::info!("DataBridge server stopped");
        Ok(())
    }
}

/// Forwards engine change notices to every subscribed session.
async fn fan_out(
    mut changes: broadcast::Receiver<ChangeNotice>,
    state: Arc<ServerState>,
) {
    loop {
        match changes.recv().await {
            Ok(notice) => {
                let delivered = state
                    .sessions
                    .lock()
                    .await
                    .publish(notice.topic.as_str(), &notice.to_payload());
                tracing::debug!(
                    topic = notice.topic.as_str(),
                    path = %notice.path,
                    delivered,
                    "change notice published"
                );
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "change fan-out lagging, notices dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
