//! Command registry and built-in commands for DataBridge.
//!
//! A command is a name, an argument schema and an async handler
//! ([`CommandSpec`]). The [`CommandRegistry`] looks commands up by name and
//! validates the request payload against the schema before the handler
//! runs, so handlers never see malformed input.
//!
//! ```text
//! request ──→ CommandRegistry::prepare ──→ handler(ctx, args) ──→ payload
//!               │ unknown name → UnknownCommand        │
//!               │ bad payload  → InvalidArguments      └─ ctx.engine().call(..)
//! ```
//!
//! Handlers reach the engine only through [`CommandContext::engine`], which
//! runs their closures on the engine context.

mod args;
pub mod builtin;
mod context;
mod error;
mod registry;
mod spec;

pub use args::{ArgField, ArgKind, ArgSchema, Args};
pub use builtin::{MAX_BATCH_SIZE, PROTOCOL_VERSION, SERVER_VERSION};
pub use context::CommandContext;
pub use error::{CommandError, RegistryError};
pub use registry::CommandRegistry;
pub use spec::{CommandResult, CommandSpec, Handler};
