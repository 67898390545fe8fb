//! Telemetry hand-off from the tick thread to the persistence task.
//!
//! One bounded tokio channel, any number of [`BridgeProducer`] clones and
//! exactly one consumer task. The producer never blocks: a full queue drops
//! the record with a warning. The consumer persists records one at a time
//! in FIFO order and logs per-record failures without stopping.
//!
//! Lifecycle: `new` → `start(sink)` → `flush`* → `stop`.

use hardening_common::telemetry::TelemetrySnapshot;
use static_assertions::assert_impl_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::TwinError;
use crate::sink::TelemetrySink;

enum BridgeMessage {
    Record(Box<TelemetrySnapshot>),
    /// Drain everything queued before this, then exit.
    Shutdown,
}

/// Counters shared by producers and the consumer.
#[derive(Debug, Default)]
struct Shared {
    accepting: AtomicBool,
    /// Accepted but not yet processed.
    pending: AtomicUsize,
    drained: Notify,
    accepted: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
}

/// Snapshot of bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub accepted: u64,
    /// Rejected: bridge not running or queue full.
    pub dropped: u64,
    pub persisted: u64,
    /// Accepted but the sink failed to store them.
    pub failed: u64,
}

/// Producer handle given to the tick thread.
#[derive(Debug, Clone)]
pub struct BridgeProducer {
    tx: mpsc::Sender<BridgeMessage>,
    shared: Arc<Shared>,
}

assert_impl_all!(BridgeProducer: Send, Sync, Clone);

impl std::fmt::Debug for BridgeMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Record(r) => write!(f, "Record({:?})", r.part_id),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl BridgeProducer {
    /// Queue `record` for persistence without blocking.
    ///
    /// Returns `false` if the record was dropped (bridge not running or
    /// queue full).
    pub fn enqueue(&self, record: TelemetrySnapshot) -> bool {
        if !self.shared.accepting.load(Ordering::Acquire) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(part_id = ?record.part_id, "telemetry bridge not running, record discarded");
            return false;
        }

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(BridgeMessage::Record(Box::new(record))) {
            Ok(()) => {
                self.shared.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(err) => {
                self.release_pending();
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                match err {
                    mpsc::error::TrySendError::Full(_) => {
                        warn!("telemetry queue full, record dropped")
                    }
                    mpsc::error::TrySendError::Closed(_) => {
                        warn!("telemetry consumer gone, record dropped")
                    }
                }
                false
            }
        }
    }

    fn release_pending(&self) {
        if self.shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.shared.drained.notify_waiters();
        }
    }
}

/// Bounded queue plus its single consumer task.
pub struct TelemetryBridge {
    tx: mpsc::Sender<BridgeMessage>,
    rx: Option<mpsc::Receiver<BridgeMessage>>,
    shared: Arc<Shared>,
    consumer: Option<JoinHandle<()>>,
}

impl TelemetryBridge {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Some(rx),
            shared: Arc::new(Shared::default()),
            consumer: None,
        }
    }

    pub fn producer(&self) -> BridgeProducer {
        BridgeProducer {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn is_running(&self) -> bool {
        self.consumer.is_some()
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            accepted: self.shared.accepted.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            persisted: self.shared.persisted.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    /// Spawn the consumer on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// `NoRuntime` outside a runtime, `BridgeAlreadyStarted` on a second call.
    pub fn start<S: TelemetrySink>(&mut self, sink: S) -> Result<(), TwinError> {
        let handle = Handle::try_current().map_err(|_| TwinError::NoRuntime)?;
        let rx = self.rx.take().ok_or(TwinError::BridgeAlreadyStarted)?;

        info!("Starting telemetry bridge (sink={})", sink.name());
        self.consumer = Some(handle.spawn(consume(rx, sink, Arc::clone(&self.shared))));
        self.shared.accepting.store(true, Ordering::Release);
        Ok(())
    }

    /// Wait until every accepted record has been processed.
    pub async fn flush(&self) -> Result<(), TwinError> {
        if self.consumer.is_none() {
            return Err(TwinError::BridgeNotStarted);
        }
        loop {
            let notified = self.shared.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
            notified.await;
        }
    }

    /// Stop accepting, drain the queue, close the sink and join the consumer.
    pub async fn stop(&mut self) -> Result<(), TwinError> {
        let consumer = self.consumer.take().ok_or(TwinError::BridgeNotStarted)?;
        self.shared.accepting.store(false, Ordering::Release);

        if self.tx.send(BridgeMessage::Shutdown).await.is_err() {
            warn!("telemetry consumer already gone before shutdown");
        }
        consumer
            .await
            .map_err(|e| TwinError::ConsumerFailed(e.to_string()))?;

        let stats = self.stats();
        info!(
            "Telemetry bridge stopped (persisted={}, failed={}, dropped={})",
            stats.persisted, stats.failed, stats.dropped
        );
        Ok(())
    }
}

async fn consume<S: TelemetrySink>(
    mut rx: mpsc::Receiver<BridgeMessage>,
    mut sink: S,
    shared: Arc<Shared>,
) {
    while let Some(message) = rx.recv().await {
        let record = match message {
            BridgeMessage::Record(record) => record,
            BridgeMessage::Shutdown => break,
        };

        match sink.persist(&record).await {
            Ok(()) => {
                shared.persisted.fetch_add(1, Ordering::Relaxed);
                trace!(part_id = ?record.part_id, state = ?record.state, "record persisted");
            }
            Err(e) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    sink = sink.name(),
                    part_id = ?record.part_id,
                    error = %e,
                    "failed to persist telemetry record"
                );
            }
        }

        if shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            shared.drained.notify_waiters();
        }
    }

    if let Err(e) = sink.close().await {
        error!(sink = sink.name(), error = %e, "failed to close telemetry sink");
    }
    debug!("telemetry consumer exited");
}
