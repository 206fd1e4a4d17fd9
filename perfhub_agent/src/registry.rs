//! Connection registry: the authoritative set of live push subscribers plus
//! the aggregate broadcast counters.
//!
//! Backed by a sharded `DashMap`, so lifecycle callbacks never contend on a
//! single lock and iteration only ever holds one shard at a time. An
//! iteration racing an `unregister` may or may not include that entry.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::SendError;
use crate::types::{ConnectionId, ConnectionStat, MetricsSnapshot, Statistics};

/// Non-blocking send capability exposed by every push connection type.
pub trait PushSink: Send + Sync {
    fn send(&self, snapshot: &MetricsSnapshot) -> Result<(), SendError>;
}

struct Connection {
    connected_at: DateTime<Utc>,
    sink: Arc<dyn PushSink>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Connection>,
    messages_sent: AtomicU64,
    failed_deliveries: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id`; re-registering an existing id replaces its sink but
    /// keeps the original connect time.
    pub fn register(&self, id: ConnectionId, sink: Arc<dyn PushSink>) {
        self.connections
            .entry(id)
            .and_modify(|c| c.sink = Arc::clone(&sink))
            .or_insert_with(|| Connection {
                connected_at: Utc::now(),
                sink,
            });
    }

    /// Returns whether `id` was present. Unknown ids (duplicate disconnect
    /// callbacks) are a no-op.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn all_connections(&self) -> Vec<(ConnectionId, DateTime<Utc>)> {
        self.connections
            .iter()
            .map(|e| (e.key().clone(), e.value().connected_at))
            .collect()
    }

    /// Sinks of every registered connection, collected so callers can push
    /// without holding any shard lock.
    pub fn sinks(&self) -> Vec<(ConnectionId, Arc<dyn PushSink>)> {
        self.connections
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(&e.value().sink)))
            .collect()
    }

    /// Drops every connection (hub shutdown). Releasing the sinks closes the
    /// per-connection queues, which ends their transport tasks.
    pub fn clear(&self) {
        self.connections.clear();
    }

    pub fn record_broadcast(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            total_messages_sent: self.messages_sent.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
            active_connections: self.count(),
        }
    }

    pub fn connection_stats(&self) -> Vec<ConnectionStat> {
        let now = Utc::now();
        let mut out: Vec<ConnectionStat> = self
            .all_connections()
            .into_iter()
            .map(|(connection_id, connected_at)| ConnectionStat {
                connection_id,
                connected_at,
                connected_for_sec: (now - connected_at).num_seconds().max(0),
            })
            .collect();
        out.sort_by_key(|c| c.connected_at);
        out
    }
}
