//! Bounded, batching write queue in front of a catalog.
//!
//! Producers `submit` events into a bounded buffer and suspend while it is
//! full. A single flush lane task drains the buffer in batches of up to
//! `batch_size`, each batch one `append_batch` transaction. A flush starts
//! when the buffer reaches `batch_size` or when the periodic timer finds it
//! non-empty.
//!
//! The first failed append stops the lane. Every waiting and later
//! `submit`/`flush` then fails with that error; nothing is retried.

mod lane;
mod stats;

pub use stats::{DelaySummary, QueueStats, QueueStatsSnapshot};

use crate::error::{CatalogError, Result};
use lane::FlushLane;
use mediacat_db::{CatalogDb, FileEvent};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Anything that accepts catalog events from a producer.
pub trait EventSink: Send + Sync {
    /// Accept one event, waiting for room if needed.
    fn submit(&self, event: FileEvent) -> impl Future<Output = Result<()>> + Send;
}

/// Queue sizing and timing.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Events per flush transaction
    pub batch_size: usize,
    /// Longest `submit` waits for room, and `flush` for each acknowledgement
    pub queue_timeout: Duration,
    /// Periodic flush timer
    pub flush_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            queue_timeout: Duration::from_secs(10),
            flush_interval: Duration::from_millis(25),
        }
    }
}

impl QueueConfig {
    /// Buffer bound: one batch plus ten percent headroom.
    pub fn capacity(&self) -> usize {
        let batch = self.batch_size.max(1);
        batch + batch / 10
    }
}

struct QueuedEvent {
    event: FileEvent,
    queued_at: Instant,
}

enum LaneCommand {
    Flush(oneshot::Sender<Result<u64>>),
    Shutdown,
}

struct Shared {
    buffer: Mutex<VecDeque<QueuedEvent>>,
    /// Free slots. Permits are forgotten on submit and returned by the lane
    /// once the batch holding those events has committed or failed.
    space: Semaphore,
    /// Size trigger; stores a wakeup if the lane is busy
    trigger: Notify,
    failure: Mutex<Option<String>>,
    stats: QueueStats,
    capacity: usize,
}

impl Shared {
    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<QueuedEvent>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn buffered(&self) -> usize {
        self.lock_buffer().len()
    }

    fn set_failure(&self, message: String) {
        let mut failure = self.failure.lock().unwrap_or_else(|p| p.into_inner());
        failure.get_or_insert(message);
    }

    fn failure(&self) -> Option<String> {
        self.failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    fn closed_error(&self) -> CatalogError {
        CatalogError::QueueClosed(
            self.failure()
                .unwrap_or_else(|| "flush lane is not running".to_string()),
        )
    }
}

/// Write queue feeding one catalog through one flush lane.
pub struct BatchWriteQueue {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<LaneCommand>,
    lane: JoinHandle<Result<()>>,
    config: QueueConfig,
}

impl BatchWriteQueue {
    /// Start the flush lane. Must be called inside a tokio runtime.
    pub fn start(db: CatalogDb, config: QueueConfig) -> Self {
        let config = QueueConfig {
            batch_size: config.batch_size.max(1),
            ..config
        };
        let capacity = config.capacity();

        let shared = Arc::new(Shared {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            space: Semaphore::new(capacity),
            trigger: Notify::new(),
            failure: Mutex::new(None),
            stats: QueueStats::default(),
            capacity,
        });

        let (commands, command_rx) = mpsc::unbounded_channel();
        let lane = FlushLane {
            db,
            shared: Arc::clone(&shared),
            commands: command_rx,
            batch_size: config.batch_size,
            flush_interval: config.flush_interval,
            last_flush_started: None,
        };
        let lane = tokio::spawn(lane.run());

        debug!(
            batch_size = config.batch_size,
            capacity,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            "Write queue started"
        );

        Self {
            shared,
            commands,
            lane,
            config,
        }
    }

    /// Accept one event into the buffer.
    ///
    /// Waits at most `queue_timeout` for room. Fails at once if the flush
    /// lane has stopped.
    pub async fn submit(&self, event: FileEvent) -> Result<()> {
        let waited = self.config.queue_timeout;
        let permit = match tokio::time::timeout(waited, self.shared.space.acquire()).await {
            Err(_) => return Err(CatalogError::QueueTimeout { waited }),
            Ok(Err(_closed)) => return Err(self.shared.closed_error()),
            Ok(Ok(permit)) => permit,
        };
        permit.forget();

        let buffered = {
            let mut buffer = self.shared.lock_buffer();
            buffer.push_back(QueuedEvent {
                event,
                queued_at: Instant::now(),
            });
            buffer.len()
        };
        self.shared.stats.record_queued();

        if buffered >= self.config.batch_size {
            self.shared.trigger.notify_one();
        }
        Ok(())
    }

    /// Block until every event submitted so far is durable.
    pub async fn flush(&self) -> Result<()> {
        loop {
            if let Some(message) = self.shared.failure() {
                return Err(CatalogError::QueueClosed(message));
            }

            // Always round-trip through the lane at least once so an
            // in-flight batch is committed before we return
            let (reply_tx, reply_rx) = oneshot::channel();
            self.commands
                .send(LaneCommand::Flush(reply_tx))
                .map_err(|_| self.shared.closed_error())?;

            let waited = self.config.queue_timeout;
            match tokio::time::timeout(waited, reply_rx).await {
                Err(_) => return Err(CatalogError::FlushTimeout { waited }),
                Ok(Err(_dropped)) => return Err(self.shared.closed_error()),
                Ok(Ok(result)) => {
                    result?;
                }
            }

            if self.shared.buffered() == 0 {
                return Ok(());
            }
        }
    }

    /// Drain what is left, stop the lane and return final statistics.
    pub async fn shutdown(self) -> Result<QueueStatsSnapshot> {
        let _ = self.commands.send(LaneCommand::Shutdown);
        match self.lane.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(join_err) => {
                return Err(CatalogError::InvalidState(format!(
                    "flush lane panicked: {}",
                    join_err
                )))
            }
        }

        let snapshot = self.shared.stats.snapshot();
        info!(
            queued = snapshot.events_queued,
            flushed = snapshot.events_flushed,
            batches = snapshot.batches,
            "Write queue shut down"
        );
        Ok(snapshot)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn buffered(&self) -> usize {
        self.shared.buffered()
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Read-only view for progress reporting from another task.
    pub fn monitor(&self) -> QueueMonitor {
        QueueMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl EventSink for BatchWriteQueue {
    fn submit(&self, event: FileEvent) -> impl Future<Output = Result<()>> + Send {
        BatchWriteQueue::submit(self, event)
    }
}

/// Cloneable handle exposing buffer usage and counters.
#[derive(Clone)]
pub struct QueueMonitor {
    shared: Arc<Shared>,
}

impl QueueMonitor {
    pub fn buffered(&self) -> usize {
        self.shared.buffered()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.shared.stats.snapshot()
    }
}
