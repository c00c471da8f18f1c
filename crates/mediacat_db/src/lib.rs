//! Append-only file event catalog.
//!
//! A catalog records every observed create/update/delete of the files under
//! one directory tree. Rows are only ever appended; the current state of a
//! path is its newest event.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mediacat_db::{CatalogDb, EventType, FileEvent};
//!
//! let db = CatalogDb::open("pics.catalog.sqlite3").await?;
//! db.append_batch(&[FileEvent::new(EventType::Create, "a.jpg", now, "desk", digest)]).await?;
//! let latest = db.latest_event("a.jpg").await?;
//! ```

mod error;
mod events;
mod schema;
mod types;

pub use error::{DbError, Result};
pub use types::{EventType, FileEvent};

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Connection settings for a catalog database.
#[derive(Debug, Clone)]
pub struct CatalogDbOptions {
    /// Maximum pooled connections (one writer plus concurrent readers)
    pub max_connections: u32,
    /// How long SQLite retries a locked database before failing
    pub busy_timeout: Duration,
}

impl Default for CatalogDbOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(10),
        }
    }
}

/// Handle to one catalog. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
    path: PathBuf,
}

impl std::fmt::Debug for CatalogDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogDb")
            .field("path", &self.path)
            .field("connections", &self.pool.size())
            .finish()
    }
}

impl CatalogDb {
    /// Open or create a catalog at the given path with default options.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, &CatalogDbOptions::default()).await
    }

    /// Open or create a catalog at the given path.
    ///
    /// Creates the event table if it doesn't exist.
    pub async fn open_with(path: impl AsRef<Path>, options: &CatalogDbOptions) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Self::connect(path, options, true).await?;
        db.ensure_schema().await?;

        info!(path = %path.display(), "Catalog opened");
        Ok(db)
    }

    /// Open an existing catalog read-only (fails if not exists).
    ///
    /// Never writes to the file: no schema creation, no journal mode change.
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DbError::not_found(format!(
                "Catalog not found: {}",
                path.display()
            )));
        }

        let options = CatalogDbOptions::default();
        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .busy_timeout(options.busy_timeout);
        let db = Self::with_pool(path, connect_options, &options).await?;
        db.verify_schema().await?;
        Ok(db)
    }

    async fn connect(path: &Path, options: &CatalogDbOptions, create: bool) -> Result<Self> {
        // WAL lets the flush writer commit while readers stream the log
        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(options.busy_timeout);
        Self::with_pool(path, connect_options, options).await
    }

    async fn with_pool(
        path: &Path,
        connect_options: SqliteConnectOptions,
        options: &CatalogDbOptions,
    ) -> Result<Self> {
        // A deletion pass holds a streaming reader while point lookups and
        // the flush writer run, so never go below three connections
        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections.max(3))
            .connect_with(connect_options)
            .await?;

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    /// Location of the catalog file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the underlying connection pool (escape hatch for ad-hoc queries).
    ///
    /// Prefer using the typed methods instead.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Current time as milliseconds since Unix epoch.
    pub fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
