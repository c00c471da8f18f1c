//! Tombstones for catalog paths that vanished from disk.
//!
//! Must run after the scan's events have been flushed, otherwise paths
//! created by the scan are not yet live and cannot be checked.

use crate::error::{CatalogError, Result};
use crate::queue::EventSink;
use crate::scanner::ScanRun;
use futures::TryStreamExt;
use mediacat_db::{CatalogDb, EventType};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionStats {
    /// Live paths checked against disk
    pub paths_checked: u64,
    pub deletes_queued: u64,
}

pub struct DeletionDetector {
    db: CatalogDb,
}

impl DeletionDetector {
    pub fn new(db: CatalogDb) -> Self {
        Self { db }
    }

    /// Submit a delete for every live path missing under `root`.
    ///
    /// The tombstone carries the fingerprint of the path's latest event. A
    /// path that cannot be checked (e.g. permission denied) is left alone.
    pub async fn detect<S: EventSink>(
        &self,
        root: &Path,
        run: &ScanRun,
        sink: &S,
    ) -> Result<DeletionStats> {
        if !root.is_dir() {
            return Err(CatalogError::RootNotFound(root.display().to_string()));
        }

        let mut stats = DeletionStats::default();
        let mut live = self.db.live_paths();

        while let Some(path) = live.try_next().await? {
            stats.paths_checked += 1;

            match tokio::fs::try_exists(root.join(&path)).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    warn!(path = %path, error = %err, "Cannot check path, assuming it still exists");
                    continue;
                }
            }

            let latest = self
                .db
                .latest_event(&path)
                .await?
                .ok_or_else(|| CatalogError::MissingLatestEvent(path.clone()))?;
            if latest.event_type == EventType::Delete {
                // Tombstoned by someone else since the live list was read
                continue;
            }

            debug!(path = %path, "Queueing delete");
            sink.submit(run.event(EventType::Delete, &path, &latest.fingerprint))
                .await?;
            stats.deletes_queued += 1;
        }

        info!(
            root = %root.display(),
            checked = stats.paths_checked,
            deleted = stats.deletes_queued,
            "Deletion check complete"
        );
        Ok(stats)
    }
}
