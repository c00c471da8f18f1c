//! Event-sourced file catalogs.
//!
//! A catalog build walks a directory tree, fingerprints every file and
//! appends create/update/delete events to a [`CatalogDb`] through a bounded
//! [`BatchWriteQueue`]. Two catalogs of the same library (say, two backup
//! copies) can then be diffed with [`reconcile`].
//!
//! ```rust,ignore
//! let db = CatalogDb::open("pics.sqlite3").await?;
//! let report = build_catalog(Path::new("/srv/pics"), &db, &CatalogConfig::default()).await?;
//!
//! let diffs = reconcile(&db, str::to_string, &backup_db, str::to_string).await?;
//! ```

pub mod config;
pub mod deletion;
pub mod error;
pub mod fingerprint;
pub mod pipeline;
pub mod queue;
pub mod reconcile;
pub mod scanner;

pub use config::{CatalogConfig, PathRewrite, PipelineConfig, ReconcileSettings};
pub use deletion::{DeletionDetector, DeletionStats};
pub use error::{CatalogError, Result};
pub use fingerprint::{
    Blake3Fingerprinter, FingerprintAlgorithm, Fingerprinter, Sha256Fingerprinter,
    FINGERPRINT_UNAVAILABLE,
};
pub use pipeline::{build_catalog, BuildReport};
pub use queue::{BatchWriteQueue, EventSink, QueueConfig, QueueStats, QueueStatsSnapshot};
pub use reconcile::{reconcile, CatalogReconciler, Diff, DiffKind, DiffSide};
pub use scanner::{ScanConfig, ScanReport, ScanRun, ScanStats, Scanner};

pub use mediacat_db::{CatalogDb, CatalogDbOptions, EventType, FileEvent};
