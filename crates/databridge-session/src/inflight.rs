//! The in-flight table: request ids awaiting their response.
//!
//! Responses are routed purely by request id, so an id may only be in
//! flight once per session. The table is the single source of truth for
//! "does this request still owe the client a response?".

use std::collections::HashMap;
use std::time::{Duration, Instant};

use databridge_protocol::MessageId;
use tokio::task::AbortHandle;

use crate::SessionError;

/// One pending request.
#[derive(Debug)]
pub struct InFlight {
    pub command: String,
    pub started: Instant,
    /// Handle to the task running the handler, once spawned.
    pub task: Option<AbortHandle>,
}

impl InFlight {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Pending requests of one session, keyed by request id.
#[derive(Debug)]
pub struct InFlightTable {
    entries: HashMap<MessageId, InFlight>,
    limit: usize,
}

impl InFlightTable {
    /// Creates an empty table that holds at most `limit` requests.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            limit,
        }
    }

    /// Marks `id` as in flight.
    ///
    /// # Errors
    /// - [`SessionError::DuplicateRequestId`] if `id` is already pending.
    ///   The existing entry is left untouched.
    /// - [`SessionError::Overloaded`] if the table is full.
    pub fn begin(
        &mut self,
        id: MessageId,
        command: &str,
    ) -> Result<(), SessionError> {
        if self.entries.contains_key(&id) {
            return Err(SessionError::DuplicateRequestId(id));
        }
        if self.entries.len() >= self.limit {
            return Err(SessionError::Overloaded { limit: self.limit });
        }
        self.entries.insert(
            id,
            InFlight {
                command: command.to_string(),
                started: Instant::now(),
                task: None,
            },
        );
        Ok(())
    }

    /// Records the task running `id`'s handler so it can be aborted.
    pub fn attach(&mut self, id: &MessageId, task: AbortHandle) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.task = Some(task);
        }
    }

    /// Removes `id`, returning its entry. `None` means no response is owed
    /// (already answered, or never registered).
    pub fn complete(&mut self, id: &MessageId) -> Option<InFlight> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aborts every pending handler task and empties the table. Returns
    /// how many requests were abandoned.
    ///
    /// Work already handed to the engine context still runs to completion
    /// there; only the waiting side is dropped.
    pub fn abort_all(&mut self) -> usize {
        let count = self.entries.len();
        for (id, entry) in self.entries.drain() {
            if let Some(task) = entry.task {
                task.abort();
            }
            tracing::debug!(
                %id,
                command = %entry.command,
                "abandoned in-flight request"
            );
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mid(n: i64) -> MessageId {
        MessageId::Number(n)
    }

    #[test]
    fn test_begin_new_id_is_tracked() {
        let mut table = InFlightTable::new(4);
        table.begin(mid(1), "ping").unwrap();
        assert!(table.contains(&mid(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_begin_duplicate_id_returns_error() {
        let mut table = InFlightTable::new(4);
        table.begin(mid(1), "ping").unwrap();
        assert!(matches!(
            table.begin(mid(1), "ping"),
            Err(SessionError::DuplicateRequestId(id)) if id == mid(1)
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_begin_string_and_number_ids_are_distinct() {
        let mut table = InFlightTable::new(4);
        table.begin(mid(1), "ping").unwrap();
        table.begin(MessageId::String("1".into()), "ping").unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_begin_at_limit_returns_overloaded() {
        let mut table = InFlightTable::new(2);
        table.begin(mid(1), "a").unwrap();
        table.begin(mid(2), "b").unwrap();
        assert!(matches!(
            table.begin(mid(3), "c"),
            Err(SessionError::Overloaded { limit: 2 })
        ));
    }

    #[test]
    fn test_complete_frees_slot_for_reuse() {
        let mut table = InFlightTable::new(1);
        table.begin(mid(1), "a").unwrap();
        assert!(table.complete(&mid(1)).is_some());
        assert!(table.complete(&mid(1)).is_none());
        table.begin(mid(1), "a").expect("id reusable after completion");
    }

    #[tokio::test]
    async fn test_abort_all_aborts_attached_tasks() {
        let mut table = InFlightTable::new(4);
        table.begin(mid(1), "slow").unwrap();
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        table.attach(&mid(1), task.abort_handle());

        assert_eq!(table.abort_all(), 1);
        assert!(table.is_empty());
        let joined = task.await;
        assert!(joined.unwrap_err().is_cancelled());
    }
}
