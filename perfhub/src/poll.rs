//! Frequent polls: one `GET /api/performance/metrics` per timer tick.

use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::error::ClientError;
use crate::session::{Emitter, SessionHandle};
use crate::types::Metrics;

pub const METRICS_PATH: &str = "/api/performance/metrics";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn metrics_url(base: &Url) -> Result<Url, ClientError> {
    Ok(base.join(METRICS_PATH)?)
}

pub async fn fetch(http: &reqwest::Client, url: &Url) -> Result<Metrics, ClientError> {
    Ok(http
        .get(url.clone())
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?)
}

/// Starts the pull timer. The first request goes out one period after start;
/// any failure reports once and ends the session.
pub fn start(
    base: &Url,
    http: reqwest::Client,
    period: Duration,
    rate_window: u64,
    events: Emitter,
) -> Result<SessionHandle, ClientError> {
    let url = metrics_url(base)?;
    let cancel = CancellationToken::new();
    let task = tokio::spawn(pull_loop(
        http,
        url,
        period,
        rate_window.max(1),
        events,
        cancel.clone(),
    ));
    Ok(SessionHandle::new(cancel, task))
}

async fn pull_loop(
    http: reqwest::Client,
    url: Url,
    period: Duration,
    rate_window: u64,
    events: Emitter,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pulls: u64 = 0;
    let mut window_start = Instant::now();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            r = fetch(&http, &url) => r,
        };
        match result {
            Ok(m) => {
                pulls += 1;
                if pulls % rate_window == 0 {
                    let elapsed = window_start.elapsed().as_secs_f64();
                    debug!(
                        pulls,
                        rate = rate_window as f64 / elapsed.max(f64::EPSILON),
                        latency_ms = started.elapsed().as_millis() as u64,
                        "pull rate"
                    );
                    window_start = Instant::now();
                }
                if !events.snapshot(m) {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, %url, "pull failed; stopping timer");
                events.failed(e.to_string());
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_url_replaces_any_path() {
        let u = metrics_url(&Url::parse("https://example.test:7079/ui/").unwrap()).unwrap();
        assert_eq!(u.as_str(), "https://example.test:7079/api/performance/metrics");
    }
}
