//! Drives the transport selector on its own task. The UI only sends
//! transport requests and reads the latest published [`View`], so drawing and
//! key handling never wait on a connect, a handshake or a teardown.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

use crate::selector::{EventOutcome, TransportSelector};
use crate::session::{EventReceiver, TransportKind};
use crate::types::Metrics;

/// Everything the UI draws, as of the last change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct View {
    pub active: Option<TransportKind>,
    /// Set while a switch to this transport is in flight.
    pub connecting: Option<TransportKind>,
    pub metrics: Metrics,
    pub received: u64,
    pub rate: Option<f64>,
    pub notification: Option<String>,
}

pub struct TransportController {
    requests: mpsc::UnboundedSender<TransportKind>,
    view: watch::Receiver<View>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl TransportController {
    pub fn spawn(selector: TransportSelector, events: EventReceiver) -> Self {
        let (requests, rx) = mpsc::unbounded_channel();
        let (view_tx, view) = watch::channel(View::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(selector, events, rx, view_tx, cancel.clone()));
        Self {
            requests,
            view,
            _guard: cancel.clone().drop_guard(),
            cancel,
            task,
        }
    }

    /// Asks for a switch to `kind`. Ignored (returns false) while another
    /// switch is still connecting; accepted requests run in order.
    pub fn request(&self, kind: TransportKind) -> bool {
        if self.view.borrow().connecting.is_some() {
            debug!(transport = kind.label(), "switch in flight, ignoring request");
            return false;
        }
        self.requests.send(kind).is_ok()
    }

    pub fn view(&self) -> View {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.view.clone()
    }

    /// Abandons any pending switch, tears the live session down and waits at
    /// most `grace` for that to finish.
    pub async fn shutdown(self, grace: Duration) {
        let Self {
            cancel, mut task, ..
        } = self;
        cancel.cancel();
        if timeout(grace, &mut task).await.is_err() {
            warn!(?grace, "transport teardown overran, aborting");
            task.abort();
        }
    }
}

async fn drive(
    mut selector: TransportSelector,
    mut events: EventReceiver,
    mut requests: mpsc::UnboundedReceiver<TransportKind>,
    view_tx: watch::Sender<View>,
    cancel: CancellationToken,
) {
    let mut view = View::default();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(kind) = requests.recv() => {
                view.connecting = Some(kind);
                view.notification = None;
                view_tx.send_replace(view.clone());

                let switched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    r = selector.select(kind) => Some(r),
                };
                let Some(result) = switched else { break };
                view.connecting = None;
                if let Err(failure) = result {
                    view.notification = Some(failure.to_string());
                }
            }
            Some(ev) = events.recv() => {
                if let EventOutcome::Failed(failure) = selector.handle_event(ev) {
                    view.notification = Some(failure.to_string());
                }
            }
        }
        refresh(&mut view, &selector);
        view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view.clone();
            true
        });
    }

    selector.shutdown().await;
    view.connecting = None;
    refresh(&mut view, &selector);
    view_tx.send_replace(view);
}

fn refresh(view: &mut View, selector: &TransportSelector) {
    view.active = selector.active();
    view.metrics = selector.display();
    view.received = selector.received();
    view.rate = selector.last_rate();
}
