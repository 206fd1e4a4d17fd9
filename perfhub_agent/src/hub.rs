//! Broadcast hub: the single periodic task that samples, publishes the latest
//! snapshot and fans it out to every registered push connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{spawn_blocking, JoinHandle};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::ConnectionRegistry;
use crate::sampler::Sampler;
use crate::source::MetricsSource;
use crate::store::SnapshotStore;
use crate::types::MetricsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Published { delivered: usize, failed: usize },
    /// Sampling failed; the previous snapshot stays current.
    Skipped,
}

pub struct Hub<S> {
    sampler: Sampler<S>,
    store: Arc<SnapshotStore>,
    registry: Arc<ConnectionRegistry>,
    summary_every: u64,
    ticks: u64,
    failed_samples: u64,
}

impl<S: MetricsSource> Hub<S> {
    pub fn new(
        sampler: Sampler<S>,
        store: Arc<SnapshotStore>,
        registry: Arc<ConnectionRegistry>,
        summary_every: u64,
    ) -> Self {
        Self {
            sampler,
            store,
            registry,
            summary_every,
            ticks: 0,
            failed_samples: 0,
        }
    }

    pub fn prime(&mut self) {
        self.sampler.prime();
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn failed_samples(&self) -> u64 {
        self.failed_samples
    }

    /// One iteration of the loop. Counts one sent message per published
    /// snapshot regardless of how many connections received it.
    pub fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;
        let outcome = match self.sampler.sample() {
            Ok(snapshot) => {
                self.store.publish(snapshot);
                let (delivered, failed) = self.broadcast(&snapshot);
                self.registry.record_broadcast();
                TickOutcome::Published { delivered, failed }
            }
            Err(e) => {
                self.failed_samples += 1;
                warn!(error = %e, "sampling failed, keeping previous snapshot");
                TickOutcome::Skipped
            }
        };
        if self.summary_every > 0 && self.ticks % self.summary_every == 0 {
            self.log_summary();
        }
        outcome
    }

    fn broadcast(&self, snapshot: &MetricsSnapshot) -> (usize, usize) {
        let mut delivered = 0;
        let mut failed = 0;
        for (id, sink) in self.registry.sinks() {
            match sink.send(snapshot) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    self.registry.record_delivery_failure();
                    warn!(connection = %id, error = %e, "push delivery failed");
                }
            }
        }
        (delivered, failed)
    }

    fn log_summary(&self) {
        let stats = self.registry.statistics();
        info!(
            active_connections = stats.active_connections,
            messages_sent = stats.total_messages_sent,
            failed_samples = self.failed_samples,
            failed_deliveries = stats.failed_deliveries,
            "hub stats"
        );
        for c in self.registry.connection_stats() {
            info!(
                connection = %c.connection_id,
                "connected for {}s",
                c.connected_for_sec
            );
        }
    }
}

/// Runs prime → one-period warm-up → tick loop until `cancel` fires.
///
/// Sampling refreshes sysinfo synchronously, so each prime and tick runs on
/// the blocking pool rather than a runtime worker.
pub fn spawn_hub<S>(
    mut hub: Hub<S>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    S: MetricsSource + 'static,
{
    tokio::spawn(async move {
        hub = match off_runtime(hub, |h| h.prime()).await {
            Some((h, ())) => h,
            None => return,
        };
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(period) => {}
        }
        while !cancel.is_cancelled() {
            hub = match off_runtime(hub, |h| h.tick()).await {
                Some((h, _)) => h,
                None => return,
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(period) => {}
            }
        }
        debug!(ticks = hub.ticks(), "hub loop stopped");
    })
}

async fn off_runtime<S, T, F>(mut hub: Hub<S>, f: F) -> Option<(Hub<S>, T)>
where
    S: MetricsSource + 'static,
    T: Send + 'static,
    F: FnOnce(&mut Hub<S>) -> T + Send + 'static,
{
    match spawn_blocking(move || {
        let out = f(&mut hub);
        (hub, out)
    })
    .await
    {
        Ok(done) => Some(done),
        Err(e) => {
            error!(error = %e, "hub tick panicked; stopping the loop");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SampleError, SendError};
    use crate::registry::PushSink;
    use crate::types::ConnectionId;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::thread::{self, ThreadId};
    use tracing_subscriber::fmt::MakeWriter;

    /// Reports an increasing process count so each tick is distinguishable.
    #[derive(Clone, Default)]
    struct Counting {
        n: Arc<AtomicU32>,
        fail: Arc<AtomicBool>,
        threads: Arc<Mutex<Vec<ThreadId>>>,
    }

    impl MetricsSource for Counting {
        fn sample_cpu_percent(&mut self) -> Result<f64, SampleError> {
            Ok(10.0)
        }
        fn sample_available_memory_mb(&mut self) -> Result<f64, SampleError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SampleError::Unavailable("memory"));
            }
            Ok(1024.0)
        }
        fn total_memory_mb(&mut self) -> Result<f64, SampleError> {
            Ok(4096.0)
        }
        fn process_count(&mut self) -> Result<u32, SampleError> {
            self.threads.lock().push(thread::current().id());
            Ok(self.n.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<u32>>);
    impl PushSink for Recording {
        fn send(&self, snapshot: &MetricsSnapshot) -> Result<(), SendError> {
            self.0.lock().push(snapshot.total_processes);
            Ok(())
        }
    }

    struct Broken;
    impl PushSink for Broken {
        fn send(&self, _snapshot: &MetricsSnapshot) -> Result<(), SendError> {
            Err(SendError::Closed)
        }
    }

    /// Log sink for the fmt subscriber; `take` drains what was written.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn take(&self) -> String {
            String::from_utf8_lossy(&std::mem::take(&mut *self.0.lock())).into_owned()
        }
    }

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;
        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    type Parts = (Hub<Counting>, Arc<SnapshotStore>, Arc<ConnectionRegistry>);

    fn hub_with(src: Counting) -> Parts {
        let store = Arc::new(SnapshotStore::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = Hub::new(Sampler::new(src), store.clone(), registry.clone(), 10);
        (hub, store, registry)
    }

    #[test]
    fn counts_one_message_per_tick_without_subscribers() {
        let (mut hub, _store, registry) = hub_with(Counting::default());
        for _ in 0..25 {
            assert_eq!(
                hub.tick(),
                TickOutcome::Published {
                    delivered: 0,
                    failed: 0
                }
            );
        }
        let stats = registry.statistics();
        assert_eq!(stats.total_messages_sent, 25);
        assert_eq!(stats.active_connections, 0);
    }

    #[test]
    fn connection_receives_only_ticks_while_registered() {
        let (mut hub, _store, registry) = hub_with(Counting::default());
        let sink = Arc::new(Recording::default());
        let id = ConnectionId::new();

        for tick in 0..25u32 {
            if tick == 5 {
                registry.register(id.clone(), sink.clone());
            }
            if tick == 15 {
                registry.unregister(&id);
            }
            hub.tick();
        }

        // process_count is 1-based, so tick k carries k + 1.
        let got = sink.0.lock().clone();
        assert_eq!(got, (6..=15).collect::<Vec<u32>>());
        assert_eq!(registry.total_messages_sent(), 25);
    }

    #[test]
    fn failing_connection_does_not_block_others() {
        let (mut hub, _store, registry) = hub_with(Counting::default());
        let good = Arc::new(Recording::default());
        registry.register("broken".into(), Arc::new(Broken));
        registry.register("good".into(), good.clone());

        let outcome = hub.tick();
        assert_eq!(
            outcome,
            TickOutcome::Published {
                delivered: 1,
                failed: 1
            }
        );
        hub.tick();
        assert_eq!(good.0.lock().len(), 2);
        // The hub never evicts; that is the connection's own lifecycle.
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.statistics().failed_deliveries, 2);
    }

    #[test]
    fn failed_sample_keeps_previous_snapshot() {
        let src = Counting::default();
        let fail = src.fail.clone();
        let (mut hub, store, registry) = hub_with(src);

        hub.tick();
        let before = store.current();
        fail.store(true, Ordering::SeqCst);
        assert_eq!(hub.tick(), TickOutcome::Skipped);
        assert_eq!(store.current(), before);
        assert_eq!(registry.total_messages_sent(), 1);
        assert_eq!(hub.failed_samples(), 1);

        fail.store(false, Ordering::SeqCst);
        hub.tick();
        assert_ne!(store.current(), before);
        assert_eq!(registry.total_messages_sent(), 2);
    }

    #[test]
    fn summary_is_logged_every_tenth_tick_with_a_line_per_connection() {
        let out = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(out.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let (mut hub, _store, registry) = hub_with(Counting::default());
        registry.register("first".into(), Arc::new(Recording::default()));
        registry.register("second".into(), Arc::new(Recording::default()));

        tracing::subscriber::with_default(subscriber, || {
            for tick in 1..=25u64 {
                hub.tick();
                let text = out.take();
                let summaries = text.lines().filter(|l| l.contains("hub stats")).count();
                let per_connection = text
                    .lines()
                    .filter(|l| l.contains("connected for"))
                    .count();
                if tick % 10 == 0 {
                    assert_eq!(summaries, 1, "tick {tick}:\n{text}");
                    assert_eq!(per_connection, 2, "tick {tick}:\n{text}");
                    assert!(text.contains("active_connections=2"), "{text}");
                    assert!(text.contains(&format!("messages_sent={tick}")), "{text}");
                } else {
                    assert_eq!(summaries, 0, "tick {tick}:\n{text}");
                    assert_eq!(per_connection, 0, "tick {tick}:\n{text}");
                }
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_sample_off_the_runtime_thread() {
        let src = Counting::default();
        let threads = src.threads.clone();
        let (hub, _store, registry) = hub_with(src);
        let cancel = CancellationToken::new();
        let handle = spawn_hub(hub, Duration::from_secs(1), cancel.clone());

        sleep(Duration::from_millis(3_500)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(registry.total_messages_sent(), 3);
        let runtime_thread = thread::current().id();
        let seen = threads.lock().clone();
        assert_eq!(seen.len(), 3);
        assert!(seen.iter().all(|t| *t != runtime_thread));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_warms_up_then_ticks_every_period() {
        let (hub, store, registry) = hub_with(Counting::default());
        let cancel = CancellationToken::new();
        let handle = spawn_hub(hub, Duration::from_secs(1), cancel.clone());

        // Still warming up: nothing published yet.
        sleep(Duration::from_millis(500)).await;
        assert_eq!(registry.total_messages_sent(), 0);
        assert_eq!(store.current(), MetricsSnapshot::default());

        // Ticks at t = 1s..=5s.
        sleep(Duration::from_millis(5_000)).await;
        assert_eq!(registry.total_messages_sent(), 5);

        cancel.cancel();
        handle.await.unwrap();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(registry.total_messages_sent(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_warm_up_publishes_nothing() {
        let (hub, _store, registry) = hub_with(Counting::default());
        let cancel = CancellationToken::new();
        let handle = spawn_hub(hub, Duration::from_secs(1), cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(registry.total_messages_sent(), 0);
    }
}
