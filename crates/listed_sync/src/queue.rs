//! Buffer for updates produced while offline.

use listed_core::Update;
use std::collections::VecDeque;

/// FIFO of local updates waiting for connectivity.
///
/// Unbounded and in-memory only; buffered updates are lost if the process
/// exits, but the persisted baseline already contains them.
#[derive(Debug, Clone, Default)]
pub struct PendingUpdateQueue {
    updates: VecDeque<Update>,
}

impl PendingUpdateQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an update.
    pub fn enqueue(&mut self, update: Update) {
        self.updates.push_back(update);
    }

    /// Removes the oldest update.
    pub fn dequeue(&mut self) -> Option<Update> {
        self.updates.pop_front()
    }

    /// Puts an update back at the head, ahead of everything buffered.
    pub fn push_front(&mut self, update: Update) {
        self.updates.push_front(update);
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Returns the number of buffered updates.
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Returns a copy of the buffered updates, oldest first.
    pub fn snapshot(&self) -> Vec<Update> {
        self.updates.iter().cloned().collect()
    }

    /// Removes and returns every buffered update, oldest first.
    pub fn drain(&mut self) -> Vec<Update> {
        self.updates.drain(..).collect()
    }
}
