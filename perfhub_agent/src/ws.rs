//! WebSocket upgrade and per-connection push task.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::error::SendError;
use crate::registry::{ConnectionRegistry, PushSink};
use crate::state::AppState;
use crate::types::{ConnectionId, HubMessage, MetricsSnapshot};

pub const TRANSPORT_NAME: &str = "webSockets";

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Bounded hand-off from the hub tick to the socket writer.
struct ChannelSink(mpsc::Sender<MetricsSnapshot>);

impl PushSink for ChannelSink {
    fn send(&self, snapshot: &MetricsSnapshot) -> Result<(), SendError> {
        self.0.try_send(*snapshot).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Backlogged,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let id = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<MetricsSnapshot>(state.queue_capacity);

    // Unregister on every exit path (drop).
    struct ConnectionGuard {
        registry: Arc<ConnectionRegistry>,
        id: ConnectionId,
    }
    impl Drop for ConnectionGuard {
        fn drop(&mut self) {
            if self.registry.unregister(&self.id) {
                info!(connection = %self.id, transport = TRANSPORT_NAME, "disconnected");
            }
        }
    }

    state.registry.register(id.clone(), Arc::new(ChannelSink(tx)));
    let _guard = ConnectionGuard {
        registry: Arc::clone(&state.registry),
        id: id.clone(),
    };
    info!(connection = %id, transport = TRANSPORT_NAME, "connected");

    let hello = HubMessage::Connected {
        connection_id: id.to_string(),
    };
    if send_frame(&mut socket, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some(snapshot) => {
                    let frame = HubMessage::ReceivePerformanceData(snapshot);
                    if let Err(e) = send_frame(&mut socket, &frame).await {
                        debug!(connection = %id, error = %e, "socket write failed");
                        break;
                    }
                }
                // Sink dropped by the registry (hub shutdown).
                None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(connection = %id, error = %e, "socket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &HubMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(js) => socket.send(Message::Text(js)).await,
        Err(e) => {
            warn!(error = %e, "failed to encode hub frame");
            Ok(())
        }
    }
}
