//! Bounded history of recently discovered items.

use std::collections::VecDeque;

use crate::types::ScanRecord;

/// Newest-first ring of [`ScanRecord`]s.
#[derive(Debug)]
pub struct RecentBuffer {
    records: VecDeque<ScanRecord>,
    capacity: usize,
}

impl RecentBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the front, dropping the oldest record past capacity.
    pub fn push(&mut self, record: ScanRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    /// Drop every record produced by `agent_id`.
    pub fn remove_agent(&mut self, agent_id: &str) -> usize {
        let before = self.records.len();
        self.records.retain(|r| r.agent_id != agent_id);
        before - self.records.len()
    }

    /// Oldest first, so a client can replay it in order.
    pub fn history(&self) -> Vec<ScanRecord> {
        self.records.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
