//! The flush lane: the single task that owns every catalog write.

use super::{LaneCommand, QueuedEvent, Shared};
use crate::error::{CatalogError, Result};
use mediacat_db::{CatalogDb, FileEvent};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

pub(super) struct FlushLane {
    pub(super) db: CatalogDb,
    pub(super) shared: Arc<Shared>,
    pub(super) commands: mpsc::UnboundedReceiver<LaneCommand>,
    pub(super) batch_size: usize,
    pub(super) flush_interval: Duration,
    pub(super) last_flush_started: Option<Instant>,
}

impl FlushLane {
    /// Run until shutdown or the first failed append.
    pub(super) async fn run(mut self) -> Result<()> {
        let first_tick = tokio::time::Instant::now() + self.flush_interval;
        let mut ticker = tokio::time::interval_at(first_tick, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shared = Arc::clone(&self.shared);

        loop {
            tokio::select! {
                biased;

                cmd = self.commands.recv() => match cmd {
                    Some(LaneCommand::Flush(reply)) => match self.flush_once().await {
                        Ok(n) => {
                            let _ = reply.send(Ok(n));
                        }
                        Err(err) => {
                            let message = self.fail(&err);
                            let _ = reply.send(Err(err));
                            return Err(CatalogError::QueueClosed(message));
                        }
                    },
                    // Queue handle dropped without shutdown: drain all the same
                    Some(LaneCommand::Shutdown) | None => return self.drain().await,
                },

                _ = shared.trigger.notified() => {
                    while shared.buffered() >= self.batch_size {
                        self.step().await?;
                    }
                }

                _ = ticker.tick() => {
                    if shared.buffered() > 0 {
                        self.step().await?;
                    }
                }
            }
        }
    }

    async fn drain(&mut self) -> Result<()> {
        while self.shared.buffered() > 0 {
            self.step().await?;
        }
        debug!("Flush lane drained");
        Ok(())
    }

    async fn step(&mut self) -> Result<u64> {
        match self.flush_once().await {
            Ok(n) => Ok(n),
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Persist up to one batch from the head of the buffer.
    async fn flush_once(&mut self) -> Result<u64> {
        let batch: Vec<QueuedEvent> = {
            let mut buffer = self.shared.lock_buffer();
            let n = buffer.len().min(self.batch_size);
            buffer.drain(..n).collect()
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let started = Instant::now();
        if let Some(previous) = self.last_flush_started.replace(started) {
            self.shared.stats.record_inter_batch(started - previous);
        }
        for queued in &batch {
            self.shared
                .stats
                .record_queue_delay(started.saturating_duration_since(queued.queued_at));
        }

        let events: Vec<FileEvent> = batch.into_iter().map(|q| q.event).collect();
        let result = self.db.append_batch(&events).await;

        // Slots stay reserved until the transaction resolves
        self.shared.space.add_permits(events.len());

        let inserted = result.map_err(CatalogError::Persistence)?;
        let elapsed = started.elapsed();
        self.shared.stats.record_batch(inserted, elapsed);
        info!(events = inserted, "Flushed batch");
        debug!(elapsed_ms = elapsed.as_millis() as u64, "Batch commit timing");
        Ok(inserted)
    }

    /// Record the failure and refuse all further submissions.
    fn fail(&self, err: &CatalogError) -> String {
        let message = err.to_string();
        error!(error = %message, "Flush lane stopped");
        self.shared.set_failure(message.clone());
        self.shared.space.close();
        message
    }
}
