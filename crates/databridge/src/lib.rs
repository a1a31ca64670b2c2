//! # DataBridge
//!
//! A JSON bridge that lets external tools read and edit editor data
//! (assets, actors, gameplay tags, DataTables) over a local socket.
//!
//! Clients send framed JSON requests; the server validates them against
//! the command registry, runs the handler's engine work on the single
//! engine context, and answers each request id exactly once. Engine
//! changes are pushed to subscribed sessions as events.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use databridge::prelude::*;
//!
//! # async fn demo() -> Result<(), BridgeError> {
//! let server = BridgeServer::builder()
//!     .bind("127.0.0.1:8742")
//!     .build(MemoryEngine::sample())
//!     .await?;
//! let stop = server.shutdown_handle();
//! tokio::spawn(async move {
//!     let _ = tokio::signal::ctrl_c().await;
//!     stop.stop();
//! });
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;
pub mod telemetry;

pub use config::{BridgeConfig, ConfigError, DEFAULT_PORT};
pub use error::BridgeError;
pub use handler::SESSION_REFUSED_TOPIC;
pub use server::{BridgeServer, BridgeServerBuilder, ShutdownHandle};

pub use databridge_commands as commands;
pub use databridge_engine as engine;
pub use databridge_protocol as protocol;
pub use databridge_session as session;
pub use databridge_transport as transport;

/// Everything needed to embed the bridge and write commands.
pub mod prelude {
    pub use crate::{
        BridgeConfig, BridgeError, BridgeServer, BridgeServerBuilder,
        ShutdownHandle,
    };
    pub use databridge_commands::{
        ArgKind, ArgSchema, Args, CommandContext, CommandError, CommandResult,
        CommandSpec,
    };
    pub use databridge_engine::{EngineFacade, MemoryEngine};
    pub use databridge_protocol::{
        ErrorInfo, ErrorKind, Framing, Map, Message, MessageId, StructuredValue,
    };
}
