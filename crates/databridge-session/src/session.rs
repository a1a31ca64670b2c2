//! Session types: the server's record of one client connection.
//!
//! A session tracks:
//! - WHO the client is (`SessionId`, plus a random token it can quote)
//! - WHAT state the connection is in (connecting, active, draining, closed)
//! - WHICH requests are awaiting a response (the in-flight table)
//! - WHAT server-pushed events it wants (its subscriptions)

use std::fmt;
use std::time::{Duration, Instant};

use databridge_protocol::MessageId;

use crate::{InFlightTable, SessionError, Subscriptions};

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A unique identifier for a session, assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Per-session limits.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum number of requests awaiting a response at once.
    ///
    /// Default: 64.
    pub max_in_flight: usize,

    /// How long a draining session waits for in-flight handlers before
    /// they are abandoned.
    ///
    /// Default: 2 seconds.
    pub drain_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 64,
            drain_grace: Duration::from_secs(2),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The lifecycle state of a session.
///
/// ```text
///   Connecting ──(first valid frame / hello)──→ Active
///       │                                         │
///       └──────(disconnect, codec error)──→ Draining ←┘
///                                               │
///                                  (in-flight done or grace elapsed)
///                                               ▼
///                                             Closed
/// ```
///
/// - **Connecting**: socket accepted, no valid frame seen yet.
/// - **Active**: requests are read, dispatched and answered concurrently.
/// - **Draining**: no new requests; in-flight handlers get a bounded grace
///   period to finish.
/// - **Closed**: resources released. Terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

impl SessionState {
    /// Returns the state that follows this one on the normal path.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Connecting => Some(Self::Active),
            Self::Active => Some(Self::Draining),
            Self::Draining => Some(Self::Closed),
            Self::Closed => None,
        }
    }

    /// Returns `true` if transitioning to `target` is valid.
    ///
    /// Besides the normal path, a session that never became active may go
    /// straight to `Draining`.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
            || (self == Self::Connecting && target == Self::Draining)
    }

    /// Returns `true` if new requests may be dispatched.
    pub fn is_accepting(self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }

    /// Returns `true` once the session reached its terminal state.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Active => write!(f, "Active"),
            Self::Draining => write!(f, "Draining"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One client's session, owned by the task driving its connection.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    token: String,
    state: SessionState,
    in_flight: InFlightTable,
    subscriptions: Subscriptions,
    next_event: u64,
    opened_at: Instant,
}

impl Session {
    /// Creates a session in the `Connecting` state.
    pub fn new(
        id: SessionId,
        token: String,
        subscriptions: Subscriptions,
        config: &SessionConfig,
    ) -> Self {
        Self {
            id,
            token,
            state: SessionState::Connecting,
            in_flight: InFlightTable::new(config.max_in_flight),
            subscriptions,
            next_event: 1,
            opened_at: Instant::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The random token handed to the client in the `hello` reply.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    pub fn in_flight(&self) -> &InFlightTable {
        &self.in_flight
    }

    pub fn in_flight_mut(&mut self) -> &mut InFlightTable {
        &mut self.in_flight
    }

    /// How long the session has existed.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Moves to `target`.
    ///
    /// # Errors
    /// Returns [`SessionError::InvalidTransition`] if the state machine
    /// does not allow it.
    pub fn transition(
        &mut self,
        target: SessionState,
    ) -> Result<(), SessionError> {
        if !self.state.can_transition_to(target) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: target,
            });
        }
        tracing::debug!(
            session_id = %self.id,
            from = %self.state,
            to = %target,
            "session state changed"
        );
        self.state = target;
        Ok(())
    }

    /// Activates a `Connecting` session. Returns `true` if this call did
    /// the activation.
    pub fn activate(&mut self) -> bool {
        if self.state == SessionState::Connecting {
            self.state = SessionState::Active;
            tracing::debug!(session_id = %self.id, "session active");
            true
        } else {
            false
        }
    }

    /// Registers a new request as in flight.
    ///
    /// # Errors
    /// - [`SessionError::NotAccepting`] once draining
    /// - [`SessionError::DuplicateRequestId`] if `id` is still pending
    /// - [`SessionError::Overloaded`] at the in-flight limit
    pub fn begin_request(
        &mut self,
        id: &MessageId,
        command: &str,
    ) -> Result<(), SessionError> {
        if !self.state.is_accepting() {
            return Err(SessionError::NotAccepting(self.state));
        }
        self.in_flight.begin(id.clone(), command)
    }

    /// Allocates the id for the next server-pushed event: `evt-1`,
    /// `evt-2`, ...
    pub fn next_event_id(&mut self) -> MessageId {
        let id = MessageId::String(format!("evt-{}", self.next_event));
        self.next_event += 1;
        id
    }
}
