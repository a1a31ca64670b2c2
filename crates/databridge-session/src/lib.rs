//! Client session management for DataBridge.
//!
//! This crate handles the lifecycle of one client connection and the table
//! of all of them:
//!
//! 1. **State machine**: `Connecting → Active → Draining → Closed`
//!    ([`SessionState`])
//! 2. **In-flight tracking**: which request ids are awaiting a response,
//!    so every request gets exactly one ([`InFlightTable`])
//! 3. **Live-session table**: who is connected, where their outbound
//!    queue is, and what events they subscribed to ([`SessionManager`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Bridge server (above)  ← drives one session per connection
//!     ↕
//! Session layer (this crate)  ← request correlation and session bookkeeping
//!     ↕
//! Protocol layer (below)  ← provides Message, MessageId, ErrorKind
//! ```

mod error;
mod inflight;
mod manager;
mod session;
mod subscriptions;

pub use error::SessionError;
pub use inflight::{InFlight, InFlightTable};
pub use manager::{
    OpenedSession, Outbound, OutboundSender, SessionEntry, SessionManager,
};
pub use session::{Session, SessionConfig, SessionId, SessionState};
pub use subscriptions::{Subscriptions, ALL_TOPICS};
