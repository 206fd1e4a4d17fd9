//! Plumbing shared by every transport session: the event channel and the
//! stop handle.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::types::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    WebSocket,
    LongPolling,
    FrequentPolls,
}

impl TransportKind {
    /// Name used in the header and in failure notifications.
    pub fn label(self) -> &'static str {
        match self {
            TransportKind::WebSocket => "WebSocket",
            TransportKind::LongPolling => "Long Polling",
            TransportKind::FrequentPolls => "Polling",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    Snapshot(Metrics),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub epoch: u64,
    pub source: TransportKind,
    pub kind: SessionEventKind,
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Tags everything a session reports with its epoch and transport.
#[derive(Clone)]
pub struct Emitter {
    epoch: u64,
    source: TransportKind,
    tx: EventSender,
}

impl Emitter {
    pub fn new(epoch: u64, source: TransportKind, tx: EventSender) -> Self {
        Self { epoch, source, tx }
    }

    /// Returns false once the receiving side is gone.
    pub fn snapshot(&self, m: Metrics) -> bool {
        self.emit(SessionEventKind::Snapshot(m))
    }

    pub fn failed(&self, message: impl Into<String>) -> bool {
        self.emit(SessionEventKind::Failed(message.into()))
    }

    fn emit(&self, kind: SessionEventKind) -> bool {
        self.tx
            .send(SessionEvent {
                epoch: self.epoch,
                source: self.source,
                kind,
            })
            .is_ok()
    }
}

pub struct SessionHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { cancel, task }
    }

    /// Signals the session to stop and waits until its task has finished,
    /// including any goodbye it owes the server.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!(error = %e, "transport session panicked");
            }
        }
    }

    /// Signals stop without waiting; used once the session already reported
    /// its own failure.
    pub fn detach(self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitter_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let em = Emitter::new(7, TransportKind::LongPolling, tx);
        assert!(em.failed("boom"));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.epoch, 7);
        assert_eq!(ev.source, TransportKind::LongPolling);
        assert_eq!(ev.kind, SessionEventKind::Failed("boom".into()));

        drop(rx);
        assert!(!em.snapshot(Metrics::default()));
    }

    #[tokio::test]
    async fn stop_waits_for_the_task() {
        let cancel = CancellationToken::new();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            let _ = done_tx.send(());
        });
        SessionHandle::new(cancel, task).stop().await;
        assert!(done_rx.try_recv().is_ok());
    }
}
