//! Per-message debounce for read receipts.
//!
//! A message becoming visible arms a deadline `delay` in the future.  Hiding
//! it disarms the deadline and showing it again restarts the wait.  Due
//! messages are collected with [`ReadReceipts::due`].

use std::collections::HashMap;
use std::time::Duration;

use parley_shared::MessageId;
use tokio::time::Instant;

#[derive(Debug)]
pub struct ReadReceipts {
    delay: Duration,
    pending: HashMap<MessageId, Instant>,
}

impl ReadReceipts {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn visible(&mut self, id: MessageId, now: Instant) {
        self.pending.insert(id, now + self.delay);
    }

    pub fn hidden(&mut self, id: MessageId) {
        self.pending.remove(&id);
    }

    pub fn is_armed(&self, id: MessageId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Remove and return every message whose deadline has passed, earliest
    /// deadline first.
    pub fn due(&mut self, now: Instant) -> Vec<MessageId> {
        let mut ready: Vec<(Instant, MessageId)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, *id))
            .collect();
        ready.sort();

        for (_, id) in &ready {
            self.pending.remove(id);
        }
        ready.into_iter().map(|(_, id)| id).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
