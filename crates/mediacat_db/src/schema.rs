//! Catalog schema creation.
//!
//! All CREATE statements live here - single source of truth.

use crate::error::{DbError, Result};
use crate::CatalogDb;
use tracing::info;

impl CatalogDb {
    /// Ensure the event table and its lookup index exist.
    pub(crate) async fn ensure_schema(&self) -> Result<()> {
        // Append-only event log. `id` is row identity and doubles as the
        // insertion sequence used to order events that share a timestamp.
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS file_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL
                    CHECK (event_type IN ('create', 'update', 'delete')),
                file_path TEXT NOT NULL,
                time INTEGER NOT NULL,
                storage_location TEXT NOT NULL,
                fingerprint TEXT NOT NULL
            )"#,
        )
        .execute(&self.pool)
        .await?;

        // Serves latest_event(): newest event per path
        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_file_events_path_time
            ON file_events(file_path, time DESC, id DESC)"#,
        )
        .execute(&self.pool)
        .await?;

        info!("Catalog schema verified");
        Ok(())
    }

    /// Check, without writing, that this file holds a catalog.
    pub(crate) async fn verify_schema(&self) -> Result<()> {
        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'file_events'",
        )
        .fetch_one(&self.pool)
        .await?;

        if tables == 0 {
            return Err(DbError::invalid_state(format!(
                "{} is not a catalog (no file_events table)",
                self.path.display()
            )));
        }
        Ok(())
    }
}
