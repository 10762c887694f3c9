use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::types::ChangeEvent;

#[derive(Debug, Default)]
struct Inner {
    /// Highest position seen per partition since the last flush.
    pending: HashMap<String, u64>,
    /// Positions that have been flushed.
    committed: BTreeMap<String, u64>,
}

/// In-memory offset store selected by `offset.storage=memory`.
///
/// Positions are tracked as events are emitted and only become visible through
/// [`MemoryOffsetStore::committed`] once they are flushed.
#[derive(Debug, Clone, Default)]
pub struct MemoryOffsetStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the positions carried by `events`.
    pub async fn track(&self, events: &[ChangeEvent]) {
        if events.is_empty() {
            return;
        }

        let mut inner = self.inner.lock().await;
        for event in events {
            let position = inner.pending.entry(event.partition.clone()).or_default();
            *position = (*position).max(event.position);
        }
    }

    /// Commits every pending position and returns how many partitions advanced.
    pub async fn flush(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let Inner { pending, committed } = &mut *inner;

        let mut advanced = 0;
        for (partition, position) in pending.drain() {
            let committed_position = committed.entry(partition).or_default();
            if position > *committed_position {
                *committed_position = position;
                advanced += 1;
            }
        }

        advanced
    }

    /// Returns the committed position of every partition.
    pub async fn committed(&self) -> BTreeMap<String, u64> {
        self.inner.lock().await.committed.clone()
    }
}
