//! Transport selector: owns at most one live session and the values it
//! displays. Every switch tears the current session down completely before
//! the next one starts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::ClientError;
use crate::session::{
    Emitter, EventReceiver, EventSender, SessionEvent, SessionEventKind, SessionHandle,
    TransportKind,
};
use crate::tls::{self, TlsRoots};
use crate::types::Metrics;
use crate::{longpoll, poll, ws};

pub const DEFAULT_URL: &str = "http://127.0.0.1:7079";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    WebSocketPush,
    LongPollPush,
    ShortIntervalPull,
}

impl From<TransportKind> for TransportState {
    fn from(kind: TransportKind) -> Self {
        match kind {
            TransportKind::WebSocket => TransportState::WebSocketPush,
            TransportKind::LongPolling => TransportState::LongPollPush,
            TransportKind::FrequentPolls => TransportState::ShortIntervalPull,
        }
    }
}

#[derive(Clone)]
pub struct SelectorConfig {
    pub base_url: Url,
    pub pull_period: Duration,
    /// Messages per rate measurement.
    pub rate_window: u64,
    pub tls: Option<Arc<TlsRoots>>,
}

impl SelectorConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            pull_period: Duration::from_secs(1),
            rate_window: 10,
            tls: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub mode: TransportKind,
    pub message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Error: {}", self.mode.label(), self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Applied(Metrics),
    /// Event from a session that is no longer current.
    Ignored,
    Failed(Failure),
}

pub struct TransportSelector {
    config: SelectorConfig,
    http: reqwest::Client,
    tx: EventSender,
    state: TransportState,
    active: Option<TransportKind>,
    epoch: u64,
    session: Option<SessionHandle>,
    display: Metrics,
    received: u64,
    window_count: u64,
    window_start: Instant,
    last_rate: Option<f64>,
}

impl TransportSelector {
    pub fn new(config: SelectorConfig) -> Result<(Self, EventReceiver), ClientError> {
        let http = tls::http_client(config.tls.as_deref())?;
        let (tx, rx) = mpsc::unbounded_channel();
        let selector = Self {
            config,
            http,
            tx,
            state: TransportState::Disconnected,
            active: None,
            epoch: 0,
            session: None,
            display: Metrics::default(),
            received: 0,
            window_count: 0,
            window_start: Instant::now(),
            last_rate: None,
        };
        Ok((selector, rx))
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn active(&self) -> Option<TransportKind> {
        self.active
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn display(&self) -> Metrics {
        self.display
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn last_rate(&self) -> Option<f64> {
        self.last_rate
    }

    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    /// Switches to `kind`. Selecting the transport that is already active is
    /// a no-op; anything else passes through Disconnected first.
    pub async fn select(&mut self, kind: TransportKind) -> Result<(), Failure> {
        if self.active == Some(kind) {
            return Ok(());
        }
        self.teardown().await;

        self.epoch += 1;
        let events = Emitter::new(self.epoch, kind, self.tx.clone());
        let base = &self.config.base_url;
        let opened = match kind {
            TransportKind::WebSocket => ws::open(base, self.config.tls.as_deref(), events).await,
            TransportKind::LongPolling => longpoll::open(base, self.http.clone(), events).await,
            TransportKind::FrequentPolls => poll::start(
                base,
                self.http.clone(),
                self.config.pull_period,
                self.config.rate_window,
                events,
            ),
        };

        match opened {
            Ok(session) => {
                self.session = Some(session);
                self.state = kind.into();
                self.active = Some(kind);
                self.window_count = 0;
                self.window_start = Instant::now();
                info!(transport = kind.label(), epoch = self.epoch, "transport active");
                Ok(())
            }
            Err(e) => {
                warn!(transport = kind.label(), error = %e, "transport failed to start");
                Err(Failure {
                    mode: kind,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Stops the live session (if any), waits for it to finish and zeroes the
    /// displayed values.
    pub async fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
        }
        self.disconnect();
    }

    pub async fn shutdown(&mut self) {
        self.teardown().await;
        info!("transport selector shut down");
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> EventOutcome {
        if event.epoch != self.epoch || self.active != Some(event.source) {
            trace!(epoch = event.epoch, current = self.epoch, "dropping stale session event");
            return EventOutcome::Ignored;
        }
        match event.kind {
            SessionEventKind::Snapshot(m) => {
                self.apply(m);
                EventOutcome::Applied(m)
            }
            SessionEventKind::Failed(message) => {
                // The session already ended on its own.
                if let Some(session) = self.session.take() {
                    session.detach();
                }
                self.disconnect();
                let failure = Failure {
                    mode: event.source,
                    message,
                };
                warn!(%failure, "transport session failed");
                EventOutcome::Failed(failure)
            }
        }
    }

    fn apply(&mut self, m: Metrics) {
        self.display = m;
        self.received += 1;
        self.window_count += 1;
        if self.window_count >= self.config.rate_window.max(1) {
            let elapsed = self.window_start.elapsed();
            let rate = self.window_count as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
            debug!(
                received = self.received,
                rate,
                latency_ms = elapsed.as_millis() as u64,
                "message rate"
            );
            self.last_rate = Some(rate);
            self.window_count = 0;
            self.window_start = Instant::now();
        }
    }

    fn disconnect(&mut self) {
        if let Some(kind) = self.active.take() {
            info!(transport = kind.label(), "transport torn down");
        }
        self.state = TransportState::Disconnected;
        self.display = Metrics::default();
        // Anything still in flight from the old session is now stale.
        self.epoch += 1;
    }
}
