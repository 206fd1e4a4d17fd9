//! Long-polling push session: negotiate, poll until stopped, then DELETE.

use std::time::Duration;

use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ClientError;
use crate::session::{Emitter, SessionHandle};
use crate::types::{HubMessage, Metrics, Negotiated};
use crate::ws::HUB_PATH;

pub const TRANSPORT_NAME: &str = "longPolling";
// Longer than the agent's default hold so a quiet poll ends with 204.
const POLL_TIMEOUT: Duration = Duration::from_secs(40);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const NEGOTIATE_TIMEOUT: Duration = Duration::from_secs(10);

struct Endpoints {
    hub: Url,
    poll: Url,
}

impl Endpoints {
    fn new(base: &Url) -> Result<Self, ClientError> {
        Ok(Self {
            hub: base.join(HUB_PATH)?,
            poll: base.join(&format!("{HUB_PATH}/poll"))?,
        })
    }
}

pub async fn open(
    base: &Url,
    http: reqwest::Client,
    events: Emitter,
) -> Result<SessionHandle, ClientError> {
    let endpoints = Endpoints::new(base)?;
    let negotiate = base.join(&format!("{HUB_PATH}/negotiate"))?;
    let neg: Negotiated = http
        .post(negotiate)
        .timeout(NEGOTIATE_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    if neg.transport != TRANSPORT_NAME {
        return Err(ClientError::Protocol(format!(
            "negotiated transport {:?}",
            neg.transport
        )));
    }
    info!(connection = %neg.connection_id, "long-polling session established");

    let cancel = CancellationToken::new();
    let task = tokio::spawn(poll_loop(
        http,
        endpoints,
        neg.connection_id,
        events,
        cancel.clone(),
    ));
    Ok(SessionHandle::new(cancel, task))
}

async fn poll_loop(
    http: reqwest::Client,
    endpoints: Endpoints,
    id: String,
    events: Emitter,
    cancel: CancellationToken,
) {
    let failure = 'session: loop {
        let request = http
            .get(endpoints.poll.clone())
            .query(&[("id", id.as_str())])
            .timeout(POLL_TIMEOUT)
            .send();
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'session None,
            r = request => r,
        };
        match poll_once(resp).await {
            Ok(batch) => {
                for m in batch {
                    if !events.snapshot(m) {
                        break 'session None;
                    }
                }
            }
            Err(e) => break 'session Some(e),
        }
    };

    if let Some(e) = failure {
        warn!(connection = %id, error = %e, "long-polling session failed");
        events.failed(e.to_string());
    }
    // Best effort; the agent treats unknown ids as a no-op.
    let goodbye = http
        .delete(endpoints.hub)
        .query(&[("id", id.as_str())])
        .timeout(DISCONNECT_TIMEOUT)
        .send()
        .await;
    match goodbye {
        Ok(_) => debug!(connection = %id, "long-polling session closed"),
        Err(e) => debug!(connection = %id, error = %e, "disconnect request failed"),
    }
}

async fn poll_once(
    resp: Result<reqwest::Response, reqwest::Error>,
) -> Result<Vec<Metrics>, ClientError> {
    let resp = resp?;
    match resp.status() {
        StatusCode::NO_CONTENT => Ok(Vec::new()),
        StatusCode::NOT_FOUND => Err(ClientError::Closed),
        _ => {
            let frames: Vec<HubMessage> = resp.error_for_status()?.json().await?;
            Ok(frames
                .into_iter()
                .filter_map(|f| match f {
                    HubMessage::ReceivePerformanceData(m) => Some(m),
                    HubMessage::Connected { .. } => None,
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_rooted_at_the_hub() {
        let e = Endpoints::new(&Url::parse("http://127.0.0.1:7079/ignored").unwrap()).unwrap();
        assert_eq!(e.hub.as_str(), "http://127.0.0.1:7079/performanceHub");
        assert_eq!(e.poll.as_str(), "http://127.0.0.1:7079/performanceHub/poll");
    }
}
