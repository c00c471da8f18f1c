//! One catalog-build run: scan, flush, detect deletions, flush, shut down.

use crate::config::CatalogConfig;
use crate::deletion::{DeletionDetector, DeletionStats};
use crate::error::{CatalogError, Result};
use crate::queue::{BatchWriteQueue, QueueMonitor, QueueStatsSnapshot};
use crate::scanner::{ScanConfig, ScanReport, ScanRun, Scanner};
use mediacat_db::CatalogDb;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub run: ScanRun,
    pub scan: ScanReport,
    /// Absent when deletion detection was disabled
    pub deletions: Option<DeletionStats>,
    pub queue: QueueStatsSnapshot,
}

impl BuildReport {
    pub fn events_written(&self) -> u64 {
        self.queue.events_flushed
    }
}

/// Bring the catalog in line with the tree under `root`.
///
/// All events of the run share one timestamp. The queue is always shut
/// down, and when a step fails because the flush lane stopped, the lane's
/// own error is returned.
pub async fn build_catalog(
    root: &Path,
    db: &CatalogDb,
    config: &CatalogConfig,
) -> Result<BuildReport> {
    config.validate()?;
    if !root.is_dir() {
        return Err(CatalogError::RootNotFound(root.display().to_string()));
    }

    let run = ScanRun::new(config.storage_location.as_str());
    info!(
        root = %root.display(),
        catalog = %db.path().display(),
        location = %run.storage_location,
        timestamp = run.timestamp,
        "Building catalog"
    );

    let queue = BatchWriteQueue::start(db.clone(), config.pipeline.queue_config());
    let reporter = config
        .stats_report_interval()
        .map(|every| spawn_reporter(queue.monitor(), every));

    let outcome = run_steps(root, db, config, &run, &queue).await;

    if let Some(reporter) = reporter {
        reporter.abort();
    }
    let shutdown = queue.shutdown().await;

    let (scan, deletions, queue_stats) = match (outcome, shutdown) {
        (Ok((scan, deletions)), Ok(stats)) => (scan, deletions, stats),
        (Err(CatalogError::QueueClosed(_)), Err(lane_err)) => return Err(lane_err),
        (Err(err), _) => return Err(err),
        (Ok(_), Err(err)) => return Err(err),
    };

    info!(
        created = scan.stats.files_created,
        updated = scan.stats.files_updated,
        deleted = deletions.as_ref().map_or(0, |d| d.deletes_queued),
        events = queue_stats.events_flushed,
        batches = queue_stats.batches,
        "Catalog build complete"
    );

    Ok(BuildReport {
        run,
        scan,
        deletions,
        queue: queue_stats,
    })
}

async fn run_steps(
    root: &Path,
    db: &CatalogDb,
    config: &CatalogConfig,
    run: &ScanRun,
    queue: &BatchWriteQueue,
) -> Result<(ScanReport, Option<DeletionStats>)> {
    let scanner = Scanner::with_config(
        db.clone(),
        config.scan.fingerprint.fingerprinter(),
        ScanConfig {
            threads: config.scan.threads,
            follow_symlinks: config.scan.follow_symlinks,
            ..ScanConfig::default()
        },
    );
    let scan = scanner.scan(root, run, queue).await?;
    queue.flush().await?;

    let deletions = if config.scan.detect_deletions {
        let stats = DeletionDetector::new(db.clone())
            .detect(root, run, queue)
            .await?;
        queue.flush().await?;
        Some(stats)
    } else {
        None
    };

    Ok((scan, deletions))
}

fn spawn_reporter(monitor: QueueMonitor, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick is immediate
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let stats = monitor.stats();
            info!(
                queued = stats.events_queued,
                flushed = stats.events_flushed,
                batches = stats.batches,
                buffer = %format!("{}/{}", monitor.buffered(), monitor.capacity()),
                mean_queue_delay_ms = stats.queue_delay.mean_ms,
                "Write queue progress"
            );
        }
    })
}
