//! WebSocket push session against `/performanceHub`.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;
use crate::session::{Emitter, SessionHandle};
use crate::tls::TlsRoots;
use crate::types::HubMessage;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const HUB_PATH: &str = "/performanceHub";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// `http(s)://host:port` → `ws(s)://host:port/performanceHub`
pub fn hub_url(base: &Url) -> Result<Url, ClientError> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::InvalidUrl(format!("unsupported scheme {other}"))),
    };
    let mut url = base.join(HUB_PATH)?;
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidUrl(base.to_string()))?;
    Ok(url)
}

/// Connects, waits for the `Connected` acknowledgement and hands the socket
/// to a reader task. A server that accepts but never completes the handshake
/// fails the open after `HANDSHAKE_TIMEOUT`.
pub async fn open(
    base: &Url,
    tls: Option<&TlsRoots>,
    events: Emitter,
) -> Result<SessionHandle, ClientError> {
    let url = hub_url(base)?;
    let (ws, connection_id) = tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&url, tls))
        .await
        .map_err(|_| ClientError::Timeout("websocket handshake"))??;
    info!(connection = %connection_id, %url, "websocket session established");

    let cancel = CancellationToken::new();
    let task = tokio::spawn(read_loop(ws, events, cancel.clone()));
    Ok(SessionHandle::new(cancel, task))
}

async fn handshake(url: &Url, tls: Option<&TlsRoots>) -> Result<(WsStream, String), ClientError> {
    let connector = tls.map(TlsRoots::connector);
    let (mut ws, _) = connect_async_tls_with_config(url.as_str(), None, false, connector).await?;

    let connection_id = match ws.next().await {
        Some(Ok(Message::Text(txt))) => match serde_json::from_str::<HubMessage>(&txt) {
            Ok(HubMessage::Connected { connection_id }) => connection_id,
            Ok(other) => {
                return Err(ClientError::Protocol(format!(
                    "expected Connected, got {other:?}"
                )))
            }
            Err(e) => return Err(ClientError::Protocol(e.to_string())),
        },
        Some(Ok(other)) => return Err(ClientError::Protocol(format!("unexpected frame {other}"))),
        Some(Err(e)) => return Err(e.into()),
        None => return Err(ClientError::Closed),
    };
    Ok((ws, connection_id))
}

async fn read_loop(mut ws: WsStream, events: Emitter, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws.close(None)).await;
                debug!("websocket session closed");
                return;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(txt))) => match serde_json::from_str::<HubMessage>(&txt) {
                    Ok(HubMessage::ReceivePerformanceData(m)) => {
                        if !events.snapshot(m) {
                            return;
                        }
                    }
                    Ok(HubMessage::Connected { .. }) => {}
                    Err(e) => warn!(error = %e, "ignoring malformed hub frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    events.failed(ClientError::Closed.to_string());
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.failed(e.to_string());
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::TransportKind;

    #[test]
    fn hub_url_maps_schemes() {
        let u = hub_url(&Url::parse("http://127.0.0.1:7079").unwrap()).unwrap();
        assert_eq!(u.as_str(), "ws://127.0.0.1:7079/performanceHub");
        let u = hub_url(&Url::parse("https://localhost:7079/").unwrap()).unwrap();
        assert_eq!(u.as_str(), "wss://localhost:7079/performanceHub");
        assert!(hub_url(&Url::parse("ftp://host").unwrap()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out_the_handshake() {
        // Connects land in the backlog and the upgrade is never answered.
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = Url::parse(&format!("http://{}", silent.local_addr().unwrap())).unwrap();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let events = Emitter::new(1, TransportKind::WebSocket, tx);

        let err = open(&base, None, events)
            .await
            .err()
            .expect("handshake should time out");
        assert!(
            matches!(err, ClientError::Timeout("websocket handshake")),
            "{err}"
        );
    }
}
