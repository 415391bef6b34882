use std::collections::VecDeque;

use super::types::TelemetryEvent;

/// Insertion-ordered events waiting for a batch flush.
#[derive(Debug, Default)]
pub struct RetryQueue {
    items: VecDeque<TelemetryEvent>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new length.
    pub fn push(&mut self, event: TelemetryEvent) -> usize {
        self.items.push_back(event);
        self.items.len()
    }

    /// Empties the queue for an in-flight batch.
    pub fn take_all(&mut self) -> Vec<TelemetryEvent> {
        self.items.drain(..).collect()
    }

    /// Puts a failed batch back ahead of anything queued since it was taken.
    pub fn restore_front(&mut self, batch: Vec<TelemetryEvent>) {
        for event in batch.into_iter().rev() {
            self.items.push_front(event);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TelemetryEvent> {
        self.items.iter()
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }
}
