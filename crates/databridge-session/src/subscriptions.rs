//! Event subscriptions of a session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Wildcard topic: matches every event.
pub const ALL_TOPICS: &str = "*";

/// The set of event topics a session wants pushed to it.
///
/// Cheap to clone: clones share one set. The session's command handlers
/// mutate it (`subscribe`/`unsubscribe`) while the server's fan-out task
/// reads it.
#[derive(Debug, Clone, Default)]
pub struct Subscriptions {
    topics: Arc<Mutex<HashSet<String>>>,
}

impl Subscriptions {
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // A panic while holding this lock cannot leave the set half
        // updated, so poisoning is ignored.
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds topics. Returns the resulting set, sorted.
    pub fn subscribe<I, S>(&self, topics: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = self.lock();
        set.extend(topics.into_iter().map(Into::into));
        sorted(&set)
    }

    /// Removes topics. Returns the resulting set, sorted.
    pub fn unsubscribe<I, S>(&self, topics: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = self.lock();
        for topic in topics {
            set.remove(topic.as_ref());
        }
        sorted(&set)
    }

    /// Removes every topic.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns `true` if an event on `topic` should be delivered.
    pub fn matches(&self, topic: &str) -> bool {
        let set = self.lock();
        set.contains(ALL_TOPICS) || set.contains(topic)
    }

    /// The current topics, sorted.
    pub fn topics(&self) -> Vec<String> {
        sorted(&self.lock())
    }
}

fn sorted(set: &HashSet<String>) -> Vec<String> {
    let mut topics: Vec<String> = set.iter().cloned().collect();
    topics.sort();
    topics
}
