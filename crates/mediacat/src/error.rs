//! Error types for catalog building and reconciliation

use mediacat_db::DbError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Catalog pipeline error type.
///
/// Every variant is fatal to the running build or reconciliation. Per-file
/// problems (unreadable content, walk errors) are reported as data instead.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Reading the catalog failed
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// A flush transaction failed; none of its events were persisted
    #[error("Catalog append failed: {0}")]
    Persistence(#[source] DbError),

    #[error("No room on the write queue after waiting {waited:?}")]
    QueueTimeout { waited: Duration },

    #[error("Timed out after {waited:?} waiting for a flush to complete")]
    FlushTimeout { waited: Duration },

    /// The flush lane stopped after an earlier failure
    #[error("Write queue closed: {0}")]
    QueueClosed(String),

    #[error("Catalog lists '{0}' as live but has no event for it")]
    MissingLatestEvent(String),

    #[error("Scan root not found: {0}")]
    RootNotFound(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CatalogError>;
