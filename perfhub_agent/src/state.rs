//! Shared agent state handed to every HTTP/WebSocket handler.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::longpoll::LongPollSession;
use crate::registry::ConnectionRegistry;
use crate::store::SnapshotStore;
use crate::types::ConnectionId;

pub type SharedStore = Arc<SnapshotStore>;
pub type SharedRegistry = Arc<ConnectionRegistry>;
pub type LongPollSessions = Arc<DashMap<ConnectionId, Arc<LongPollSession>>>;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub registry: SharedRegistry,
    // Long-poll sessions by id; each is also registered as a push sink
    pub long_polls: LongPollSessions,

    pub queue_capacity: usize,
    pub long_poll_hold: Duration,
}

impl AppState {
    pub fn new(cfg: &AgentConfig) -> Self {
        Self::with_parts(
            Arc::new(SnapshotStore::new()),
            Arc::new(ConnectionRegistry::new()),
            cfg.queue_capacity,
            cfg.long_poll_hold,
        )
    }

    pub fn with_parts(
        store: SharedStore,
        registry: SharedRegistry,
        queue_capacity: usize,
        long_poll_hold: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            long_polls: Arc::new(DashMap::new()),
            queue_capacity: queue_capacity.max(1),
            long_poll_hold,
        }
    }

    /// Hub shutdown: close every push connection of either transport.
    pub fn close_all(&self) {
        let sessions: Vec<Arc<LongPollSession>> =
            self.long_polls.iter().map(|e| Arc::clone(e.value())).collect();
        self.long_polls.clear();
        for s in sessions {
            s.close();
        }
        self.registry.clear();
    }
}
