//! Long-polling push transport: negotiate a session, then repeatedly hold a
//! GET until snapshots are queued for it or the hold time runs out.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::SendError;
use crate::registry::PushSink;
use crate::state::AppState;
use crate::types::{ConnectionId, HubMessage, MetricsSnapshot, NegotiateResponse};

pub const TRANSPORT_NAME: &str = "longPolling";

/// Per-connection bounded queue drained by `poll`.
pub struct LongPollSession {
    queue: Mutex<VecDeque<MetricsSnapshot>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
    active_polls: AtomicUsize,
    last_seen: Mutex<Instant>,
}

impl LongPollSession {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            active_polls: AtomicUsize::new(0),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    /// Waits up to `hold` for queued snapshots. `None` once the session is
    /// closed; an empty batch when the hold expired.
    pub async fn poll(&self, hold: Duration) -> Option<Vec<MetricsSnapshot>> {
        let _active = ActivePoll::enter(self);
        let deadline = Instant::now() + hold;
        loop {
            if self.is_closed() {
                return None;
            }
            let batch: Vec<MetricsSnapshot> = self.queue.lock().drain(..).collect();
            if !batch.is_empty() {
                return Some(batch);
            }
            // notify_one leaves a permit behind, so a send racing this gap
            // still wakes the wait below.
            if timeout_at(deadline, self.notify.notified()).await.is_err() {
                return Some(Vec::new());
            }
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// No poll in flight and none finished within `idle`.
    pub fn is_idle(&self, idle: Duration, now: Instant) -> bool {
        self.active_polls.load(Ordering::Acquire) == 0
            && now.saturating_duration_since(*self.last_seen.lock()) > idle
    }

    fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }
}

impl PushSink for LongPollSession {
    fn send(&self, snapshot: &MetricsSnapshot) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        {
            let mut q = self.queue.lock();
            if q.len() >= self.capacity {
                return Err(SendError::Backlogged);
            }
            q.push_back(*snapshot);
        }
        self.notify.notify_one();
        Ok(())
    }
}

// Marks a poll in flight and refreshes last_seen on both ends, including
// when the client drops the request mid-hold.
struct ActivePoll<'a>(&'a LongPollSession);

impl<'a> ActivePoll<'a> {
    fn enter(session: &'a LongPollSession) -> Self {
        session.active_polls.fetch_add(1, Ordering::AcqRel);
        session.touch();
        Self(session)
    }
}

impl Drop for ActivePoll<'_> {
    fn drop(&mut self) {
        self.0.touch();
        self.0.active_polls.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub id: String,
}

pub async fn negotiate(State(state): State<AppState>) -> Json<NegotiateResponse> {
    let id = ConnectionId::new();
    let session = Arc::new(LongPollSession::new(state.queue_capacity));
    state.long_polls.insert(id.clone(), Arc::clone(&session));
    state.registry.register(id.clone(), session);
    info!(connection = %id, transport = TRANSPORT_NAME, "connected");
    Json(NegotiateResponse {
        connection_id: id,
        transport: TRANSPORT_NAME.to_string(),
    })
}

pub async fn poll(State(state): State<AppState>, Query(q): Query<SessionQuery>) -> Response {
    let id = ConnectionId::from(q.id);
    let Some(session) = state.long_polls.get(&id).map(|e| Arc::clone(e.value())) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match session.poll(state.long_poll_hold).await {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(batch) if batch.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Some(batch) => {
            let frames: Vec<HubMessage> = batch
                .into_iter()
                .map(HubMessage::ReceivePerformanceData)
                .collect();
            Json(frames).into_response()
        }
    }
}

pub async fn disconnect(
    State(state): State<AppState>,
    Query(q): Query<SessionQuery>,
) -> StatusCode {
    end_session(&state, &ConnectionId::from(q.id), "client disconnect");
    StatusCode::NO_CONTENT
}

fn end_session(state: &AppState, id: &ConnectionId, reason: &str) {
    if let Some((_, session)) = state.long_polls.remove(id) {
        session.close();
    }
    if state.registry.unregister(id) {
        info!(connection = %id, transport = TRANSPORT_NAME, reason, "disconnected");
    }
}

/// Ends every session that has stopped polling for longer than `idle`.
pub fn reap_idle(state: &AppState, idle: Duration, now: Instant) -> usize {
    let stale: Vec<ConnectionId> = state
        .long_polls
        .iter()
        .filter(|e| e.value().is_idle(idle, now))
        .map(|e| e.key().clone())
        .collect();
    for id in &stale {
        end_session(state, id, "idle timeout");
    }
    stale.len()
}

pub fn spawn_session_reaper(
    state: AppState,
    idle: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let every = (idle / 2).max(Duration::from_millis(100));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(every) => {}
            }
            let n = reap_idle(&state, idle, Instant::now());
            if n > 0 {
                debug!(reaped = n, "long-poll sessions timed out");
            }
        }
    })
}
