//! The session table.
//!
//! Every connected client has an entry here from the moment its connection
//! is accepted until its driver has finished draining. The table admits at
//! most `max_sessions` entries and routes engine change events to the
//! sessions subscribed to them.
//!
//! Event delivery never blocks: each session's event queue is bounded, and
//! an event for a session whose queue is full is dropped for that session
//! alone. Callers take `&mut self` for membership changes, so the server
//! keeps the table behind its own lock and releases it before any socket
//! work.

use std::collections::HashMap;

use databridge_protocol::{Message, StructuredValue};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::{SessionError, SessionId, SessionState, Subscriptions};

/// Something the session's writer should put on the wire.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A response, already addressed to its request id.
    Message(Message),
    /// A server-pushed event. The writer assigns the per-session event id.
    Event {
        topic: String,
        payload: StructuredValue,
    },
}

/// Bounded channel sender feeding one session's event queue.
pub type OutboundSender = mpsc::Sender<Outbound>;

/// The table's record of one session.
#[derive(Debug)]
pub struct SessionEntry {
    pub id: SessionId,
    pub state: SessionState,
    pub subscriptions: Subscriptions,
    outbound: OutboundSender,
}

/// What [`SessionManager::open`] hands back to the connection driver.
#[derive(Debug, Clone)]
pub struct OpenedSession {
    pub id: SessionId,
    /// 32-character hex string (128 bits of randomness).
    pub token: String,
    pub subscriptions: Subscriptions,
}

/// Tracks all live sessions.
///
/// ## Lifecycle
///
/// ```text
/// open() ──→ set_state(Active) ──→ set_state(Draining) ──→ close()
///   │                                                          │
///   ▼                                                          ▼
/// [Connecting]                                           (removed)
/// ```
pub struct SessionManager {
    sessions: HashMap<SessionId, SessionEntry>,
    next_id: u64,
    max_sessions: usize,
}

impl SessionManager {
    /// Creates an empty table admitting at most `max_sessions` sessions.
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            next_id: 1,
            max_sessions,
        }
    }

    /// Registers a new session in the `Connecting` state.
    ///
    /// # Errors
    /// Returns [`SessionError::CapacityExceeded`] at the session limit.
    pub fn open(
        &mut self,
        outbound: OutboundSender,
    ) -> Result<OpenedSession, SessionError> {
        if self.sessions.len() >= self.max_sessions {
            return Err(SessionError::CapacityExceeded {
                max: self.max_sessions,
            });
        }

        let id = SessionId(self.next_id);
        self.next_id += 1;
        let subscriptions = Subscriptions::default();
        self.sessions.insert(
            id,
            SessionEntry {
                id,
                state: SessionState::Connecting,
                subscriptions: subscriptions.clone(),
                outbound,
            },
        );

        tracing::info!(
            session_id = %id,
            live = self.sessions.len(),
            "session opened"
        );
        Ok(OpenedSession {
            id,
            token: generate_token(),
            subscriptions,
        })
    }

    /// Mirrors a session's lifecycle state into the table.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if the session is not live
    /// - [`SessionError::InvalidTransition`] if the move is not allowed
    pub fn set_state(
        &mut self,
        id: SessionId,
        state: SessionState,
    ) -> Result<(), SessionError> {
        let entry = self
            .sessions
            .get_mut(&id)
            .ok_or(SessionError::NotFound(id))?;
        if entry.state == state {
            return Ok(());
        }
        if !entry.state.can_transition_to(state) {
            return Err(SessionError::InvalidTransition {
                from: entry.state,
                to: state,
            });
        }
        entry.state = state;
        Ok(())
    }

    /// Removes a session from the table.
    pub fn close(&mut self, id: SessionId) -> Option<SessionEntry> {
        let entry = self.sessions.remove(&id)?;
        tracing::info!(
            session_id = %id,
            live = self.sessions.len(),
            "session closed"
        );
        Some(entry)
    }

    /// Pushes an event to every active session subscribed to `topic`.
    ///
    /// Returns how many sessions it was queued for. A session whose queue
    /// is full misses this event; one whose queue is gone is skipped until
    /// its driver removes it.
    pub fn publish(&self, topic: &str, payload: &StructuredValue) -> usize {
        let mut delivered = 0;
        for entry in self.sessions.values() {
            if entry.state != SessionState::Active
                || !entry.subscriptions.matches(topic)
            {
                continue;
            }
            let event = Outbound::Event {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            match entry.outbound.try_send(event) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        session_id = %entry.id,
                        topic,
                        "event queue full, event dropped for this session"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Looks up a session by id.
    pub fn get(&self, id: SessionId) -> Option<&SessionEntry> {
        self.sessions.get(&id)
    }

    /// Ids of all live sessions, sorted.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Returns the number of live sessions (any state).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================
