//! Queue counters.
//!
//! Updated lock-free from producers and the flush lane; read at any time
//! through [`QueueStats::snapshot`].

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Running counters for one [`super::BatchWriteQueue`]. Values only grow.
#[derive(Debug, Default)]
pub struct QueueStats {
    events_queued: AtomicU64,
    events_flushed: AtomicU64,
    batches: AtomicU64,
    /// Submit-to-flush-start wait per event
    queue_delay: DelayCounter,
    /// Gap between consecutive flush starts
    inter_batch_delay: DelayCounter,
    /// Wall time of each append transaction
    batch_time: DelayCounter,
}

#[derive(Debug, Default)]
struct DelayCounter {
    count: AtomicU64,
    total_us: AtomicU64,
    max_us: AtomicU64,
}

impl DelayCounter {
    fn record(&self, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_us.fetch_add(us, Ordering::Relaxed);
        self.max_us.fetch_max(us, Ordering::Relaxed);
    }

    fn summary(&self) -> DelaySummary {
        let count = self.count.load(Ordering::Relaxed);
        let total_us = self.total_us.load(Ordering::Relaxed);
        let max_us = self.max_us.load(Ordering::Relaxed);
        DelaySummary {
            count,
            total_ms: total_us as f64 / 1000.0,
            mean_ms: if count == 0 {
                0.0
            } else {
                total_us as f64 / count as f64 / 1000.0
            },
            max_ms: max_us as f64 / 1000.0,
        }
    }
}

impl QueueStats {
    pub(crate) fn record_queued(&self) {
        self.events_queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queue_delay(&self, waited: Duration) {
        self.queue_delay.record(waited);
    }

    pub(crate) fn record_inter_batch(&self, gap: Duration) {
        self.inter_batch_delay.record(gap);
    }

    pub(crate) fn record_batch(&self, events: u64, elapsed: Duration) {
        self.events_flushed.fetch_add(events, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.batch_time.record(elapsed);
    }

    pub fn events_queued(&self) -> u64 {
        self.events_queued.load(Ordering::Relaxed)
    }

    pub fn events_flushed(&self) -> u64 {
        self.events_flushed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> QueueStatsSnapshot {
        QueueStatsSnapshot {
            events_queued: self.events_queued(),
            events_flushed: self.events_flushed(),
            batches: self.batches.load(Ordering::Relaxed),
            queue_delay: self.queue_delay.summary(),
            inter_batch_delay: self.inter_batch_delay.summary(),
            batch_time: self.batch_time.summary(),
        }
    }
}

/// Point-in-time copy of [`QueueStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueueStatsSnapshot {
    pub events_queued: u64,
    pub events_flushed: u64,
    pub batches: u64,
    pub queue_delay: DelaySummary,
    pub inter_batch_delay: DelaySummary,
    pub batch_time: DelaySummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DelaySummary {
    pub count: u64,
    pub total_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
}

impl QueueStatsSnapshot {
    pub fn mean_batch_size(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.events_flushed as f64 / self.batches as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_averages() {
        let stats = QueueStats::default();
        stats.record_queued();
        stats.record_queued();
        stats.record_queue_delay(Duration::from_millis(2));
        stats.record_queue_delay(Duration::from_millis(6));
        stats.record_batch(2, Duration::from_millis(10));

        let snap = stats.snapshot();
        assert_eq!(snap.events_queued, 2);
        assert_eq!(snap.events_flushed, 2);
        assert_eq!(snap.batches, 1);
        assert_eq!(snap.queue_delay.count, 2);
        assert_eq!(snap.queue_delay.mean_ms, 4.0);
        assert_eq!(snap.queue_delay.max_ms, 6.0);
        assert_eq!(snap.batch_time.total_ms, 10.0);
        assert_eq!(snap.mean_batch_size(), 2.0);
    }

    #[test]
    fn test_empty_snapshot_has_no_nan() {
        let snap = QueueStats::default().snapshot();
        assert_eq!(snap.inter_batch_delay.mean_ms, 0.0);
        assert_eq!(snap.mean_batch_size(), 0.0);
    }
}
