//! Latest-snapshot store: one writer (the hub tick), many lock-free readers.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::types::MetricsSnapshot;

pub struct SnapshotStore {
    latest: ArcSwap<MetricsSnapshot>,
}

impl SnapshotStore {
    /// Starts out holding the zero snapshot.
    pub fn new() -> Self {
        Self {
            latest: ArcSwap::from_pointee(MetricsSnapshot::default()),
        }
    }

    /// Replaces the latest snapshot. Readers see either the old or the new
    /// value, never a mix.
    pub fn publish(&self, snapshot: MetricsSnapshot) {
        self.latest.store(Arc::new(snapshot));
    }

    pub fn current(&self) -> MetricsSnapshot {
        **self.latest.load()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
