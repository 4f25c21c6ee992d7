//! Bounded switch history

use std::collections::VecDeque;

use tokio::sync::RwLock;

use super::state::SwitchRecord;

/// Finished switches, most recent first
///
/// Records are inserted whole under the write lock, so readers never observe
/// a partially written entry.
pub struct SwitchHistory {
    records: RwLock<VecDeque<SwitchRecord>>,
    capacity: usize,
}

impl SwitchHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a finished record, evicting the oldest past capacity
    pub async fn push(&self, record: SwitchRecord) {
        let mut records = self.records.write().await;
        records.push_front(record);
        records.truncate(self.capacity);
    }

    /// Copy of the history, most recent first
    pub async fn snapshot(&self) -> Vec<SwitchRecord> {
        self.records.read().await.iter().cloned().collect()
    }

    /// Most recent finished switch
    pub async fn latest(&self) -> Option<SwitchRecord> {
        self.records.read().await.front().cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
