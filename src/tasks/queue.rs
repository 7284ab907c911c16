// src/tasks/queue.rs

use std::collections::VecDeque;

use tracing::debug;

use super::{TaskEntry, TaskSpec};

/// FIFO of task entries awaiting dispatch.
///
/// Entries are stored raw; the `%` alias is only split when an entry is
/// dequeued. The orchestrator's control loop is the sole consumer, so there
/// is no interior locking.
#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: VecDeque<TaskEntry>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, entry: impl Into<TaskEntry>) {
        let entry = entry.into();
        debug!(task = %entry.id(), "task enqueued");
        self.entries.push_back(entry);
    }

    /// Pop the oldest entry and resolve it, or `None` when empty.
    pub fn dequeue(&mut self) -> Option<TaskSpec> {
        self.entries.pop_front().map(|entry| entry.resolve())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Identifiers of everything still queued, in dispatch order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id().to_string()).collect()
    }

    /// Display names of everything still queued, in dispatch order.
    pub fn display_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.resolve().display_name)
            .collect()
    }
}

impl<E: Into<TaskEntry>> FromIterator<E> for TaskQueue {
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut queue = TaskQueue::new();
        for entry in iter {
            queue.enqueue(entry);
        }
        queue
    }
}
