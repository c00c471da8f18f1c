//! Filesystem scanner: walk, fingerprint, classify against the catalog.
//!
//! # Design
//!
//! - Walk the tree with `ignore::WalkParallel` on a blocking thread; walker
//!   threads fingerprint each file themselves
//! - Results cross to the async side through a bounded channel, so a slow
//!   catalog throttles the walk
//! - The async side looks up each path's latest event and submits
//!   create/update events to the write queue

use crate::error::{CatalogError, Result};
use crate::fingerprint::{is_unavailable, Blake3Fingerprinter, Fingerprinter};
use crate::queue::EventSink;
use ignore::WalkBuilder;
use mediacat_db::{CatalogDb, EventType, FileEvent};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Catalog paths always use forward slashes, whatever the platform.
///
/// Returns `None` when a component is not valid UTF-8; such a path could not
/// be found on disk again from its catalog form.
pub fn normalize_path_to_forward_slashes(path: &Path) -> Option<String> {
    let parts = path
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

/// Identity of one catalog-build run. Every event it produces shares these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRun {
    /// Run timestamp (milliseconds since Unix epoch), fixed at run start
    pub timestamp: i64,
    pub storage_location: String,
}

impl ScanRun {
    pub fn new(storage_location: impl Into<String>) -> Self {
        Self {
            timestamp: CatalogDb::now_millis(),
            storage_location: storage_location.into(),
        }
    }

    pub fn event(&self, event_type: EventType, path: &str, fingerprint: &str) -> FileEvent {
        FileEvent::new(
            event_type,
            path,
            self.timestamp,
            self.storage_location.as_str(),
            fingerprint,
        )
    }
}

/// Configuration for scanning operations
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Number of threads for parallel walking (0 = auto-detect CPU count)
    pub threads: usize,
    pub follow_symlinks: bool,
    /// Files in flight between the walker and the classifier
    pub channel_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            follow_symlinks: false,
            channel_capacity: 256,
        }
    }
}

/// Per-run counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub files_seen: u64,
    pub files_created: u64,
    pub files_updated: u64,
    pub files_unchanged: u64,
    pub fingerprint_failures: u64,
    pub walk_errors: u64,
    pub events_queued: u64,
    pub dirs_scanned: u64,
    pub bytes_scanned: u64,
    pub duration_ms: u64,
}

/// An entry the walker could not read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub stats: ScanStats,
    pub errors: Vec<ScanError>,
}

struct ScannedFile {
    rel_path: String,
    fingerprint: String,
}

enum WalkItem {
    File(ScannedFile),
    Error(ScanError),
}

#[derive(Default)]
struct WalkTotals {
    dirs: AtomicU64,
    bytes: AtomicU64,
}

/// Event to emit for a file, given the path's latest catalog event.
pub fn classify(latest: Option<&FileEvent>, fingerprint: &str) -> Option<EventType> {
    match latest {
        None => Some(EventType::Create),
        Some(prev) if prev.event_type == EventType::Delete => Some(EventType::Create),
        Some(prev) if prev.fingerprint != fingerprint => Some(EventType::Update),
        Some(_) => None,
    }
}

/// Scanner for one catalog
pub struct Scanner {
    db: CatalogDb,
    fingerprinter: Arc<dyn Fingerprinter>,
    config: ScanConfig,
}

impl Scanner {
    /// Create a scanner with BLAKE3 fingerprints and default settings
    pub fn new(db: CatalogDb) -> Self {
        Self::with_config(db, Arc::new(Blake3Fingerprinter), ScanConfig::default())
    }

    pub fn with_config(
        db: CatalogDb,
        fingerprinter: Arc<dyn Fingerprinter>,
        config: ScanConfig,
    ) -> Self {
        Self {
            db,
            fingerprinter,
            config,
        }
    }

    /// Scan `root` and submit an event for every new or changed file.
    ///
    /// Unreadable files get the unavailable fingerprint; unreadable
    /// directories are collected in the report. A failed submit or catalog
    /// read aborts the scan.
    pub async fn scan<S: EventSink>(
        &self,
        root: &Path,
        run: &ScanRun,
        sink: &S,
    ) -> Result<ScanReport> {
        let start = Instant::now();
        if !root.is_dir() {
            return Err(CatalogError::RootNotFound(root.display().to_string()));
        }
        info!(
            root = %root.display(),
            algorithm = ?self.fingerprinter.algorithm(),
            "Starting scan"
        );

        let (tx, mut rx) = mpsc::channel::<WalkItem>(self.config.channel_capacity.max(1));
        let totals = Arc::new(WalkTotals::default());

        let walk = {
            let root = root.to_path_buf();
            let fingerprinter = Arc::clone(&self.fingerprinter);
            let config = self.config.clone();
            let totals = Arc::clone(&totals);
            tokio::task::spawn_blocking(move || {
                parallel_walk(&root, &config, fingerprinter, tx, &totals)
            })
        };

        let mut stats = ScanStats::default();
        let mut errors = Vec::new();

        while let Some(item) = rx.recv().await {
            let file = match item {
                WalkItem::File(file) => file,
                WalkItem::Error(err) => {
                    warn!(path = %err.path, error = %err.message, "Walk error");
                    errors.push(err);
                    continue;
                }
            };

            stats.files_seen += 1;
            if is_unavailable(&file.fingerprint) {
                stats.fingerprint_failures += 1;
                warn!(path = %file.rel_path, "Could not read file, recording it as unavailable");
            }

            let latest = self.db.latest_event(&file.rel_path).await?;
            let Some(event_type) = classify(latest.as_ref(), &file.fingerprint) else {
                stats.files_unchanged += 1;
                continue;
            };

            match event_type {
                EventType::Create => stats.files_created += 1,
                EventType::Update => stats.files_updated += 1,
                EventType::Delete => {}
            }
            debug!(path = %file.rel_path, event = %event_type, "Queueing event");
            sink.submit(run.event(event_type, &file.rel_path, &file.fingerprint))
                .await?;
            stats.events_queued += 1;
        }

        walk.await
            .map_err(|e| CatalogError::InvalidState(format!("Walk task panicked: {}", e)))?;

        stats.walk_errors = errors.len() as u64;
        stats.dirs_scanned = totals.dirs.load(Ordering::Relaxed);
        stats.bytes_scanned = totals.bytes.load(Ordering::Relaxed);
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            root = %root.display(),
            seen = stats.files_seen,
            created = stats.files_created,
            updated = stats.files_updated,
            unchanged = stats.files_unchanged,
            fingerprint_failures = stats.fingerprint_failures,
            walk_errors = stats.walk_errors,
            duration_ms = stats.duration_ms,
            "Scan complete"
        );

        Ok(ScanReport { stats, errors })
    }
}

/// Walk `root` on the ignore crate's worker threads.
///
/// Returns once the walk finishes or the receiver goes away.
fn parallel_walk(
    root: &Path,
    config: &ScanConfig,
    fingerprinter: Arc<dyn Fingerprinter>,
    tx: mpsc::Sender<WalkItem>,
    totals: &WalkTotals,
) {
    let walker = WalkBuilder::new(root)
        .threads(config.threads)
        .hidden(false)
        .follow_links(config.follow_symlinks)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    let root: PathBuf = root.to_path_buf();

    walker.run(|| {
        let root = root.clone();
        let tx = tx.clone();
        let fingerprinter = Arc::clone(&fingerprinter);

        Box::new(move |entry| {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let item = WalkItem::Error(ScanError {
                        path: error_path(&e).unwrap_or_else(|| "unknown".to_string()),
                        message: e.to_string(),
                    });
                    return send(&tx, item);
                }
            };

            let path = entry.path();
            if path == root {
                return ignore::WalkState::Continue;
            }

            // entry.file_type() does not follow links, metadata() may
            let Some(file_type) = entry.file_type() else {
                return ignore::WalkState::Continue;
            };
            if file_type.is_symlink() {
                return ignore::WalkState::Continue;
            }

            let rel = path.strip_prefix(&root).unwrap_or(path);
            let Some(rel_path) = normalize_path_to_forward_slashes(rel) else {
                let item = WalkItem::Error(ScanError {
                    path: path.display().to_string(),
                    message: "path is not valid UTF-8".to_string(),
                });
                // Nothing under a non-UTF-8 directory is addressable either
                return match send(&tx, item) {
                    ignore::WalkState::Continue if file_type.is_dir() => ignore::WalkState::Skip,
                    state => state,
                };
            };

            if file_type.is_dir() {
                totals.dirs.fetch_add(1, Ordering::Relaxed);
                return ignore::WalkState::Continue;
            }
            if !file_type.is_file() {
                return ignore::WalkState::Continue;
            }

            if let Ok(metadata) = entry.metadata() {
                totals.bytes.fetch_add(metadata.len(), Ordering::Relaxed);
            }

            let fingerprint = fingerprinter.fingerprint(path);

            send(
                &tx,
                WalkItem::File(ScannedFile {
                    rel_path,
                    fingerprint,
                }),
            )
        })
    });
}

/// Blocks while the channel is full; stops the walk once the scan has gone.
fn send(tx: &mpsc::Sender<WalkItem>, item: WalkItem) -> ignore::WalkState {
    match tx.blocking_send(item) {
        Ok(()) => ignore::WalkState::Continue,
        Err(_) => ignore::WalkState::Quit,
    }
}

fn error_path(err: &ignore::Error) -> Option<String> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.display().to_string()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fingerprint::FINGERPRINT_UNAVAILABLE;
    use std::fs;
    use std::future::Future;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Sink that records events instead of writing them.
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub(crate) events: Mutex<Vec<FileEvent>>,
    }

    impl RecordingSink {
        pub(crate) fn sorted(&self) -> Vec<FileEvent> {
            let mut events = self.events.lock().unwrap().clone();
            events.sort_by(|a, b| a.file_path.cmp(&b.file_path));
            events
        }
    }

    impl EventSink for RecordingSink {
        fn submit(&self, event: FileEvent) -> impl Future<Output = Result<()>> + Send {
            self.events.lock().unwrap().push(event);
            async { Ok(()) }
        }
    }

    /// Fails on any file whose name starts with "bad"
    struct PickyFingerprinter;

    impl Fingerprinter for PickyFingerprinter {
        fn fingerprint(&self, path: &Path) -> String {
            let name = path.file_name().unwrap().to_string_lossy();
            if name.starts_with("bad") {
                FINGERPRINT_UNAVAILABLE.to_string()
            } else {
                Blake3Fingerprinter.fingerprint(path)
            }
        }

        fn algorithm(&self) -> crate::fingerprint::FingerprintAlgorithm {
            crate::fingerprint::FingerprintAlgorithm::Blake3
        }
    }

    fn create_test_file(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    async fn setup() -> (TempDir, TempDir, CatalogDb) {
        let tree = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        let db = CatalogDb::open(db_dir.path().join("catalog.sqlite3"))
            .await
            .unwrap();
        (tree, db_dir, db)
    }

    fn digest(content: &str) -> String {
        blake3::hash(content.as_bytes()).to_hex().to_string()
    }

    #[test]
    fn test_classify() {
        let run = ScanRun {
            timestamp: 1,
            storage_location: "t".into(),
        };
        let live = run.event(EventType::Update, "a", "f1");
        let gone = run.event(EventType::Delete, "a", "f1");

        assert_eq!(classify(None, "f1"), Some(EventType::Create));
        assert_eq!(classify(Some(&gone), "f1"), Some(EventType::Create));
        assert_eq!(classify(Some(&live), "f2"), Some(EventType::Update));
        assert_eq!(classify(Some(&live), "f1"), None);
    }

    #[test]
    fn test_normalize_path() {
        let path = Path::new("a").join("b").join("c.jpg");
        assert_eq!(
            normalize_path_to_forward_slashes(&path).as_deref(),
            Some("a/b/c.jpg")
        );
    }

    #[tokio::test]
    async fn test_new_tree_emits_creates() {
        let (tree, _db_dir, db) = setup().await;
        create_test_file(tree.path(), "a.jpg", "one");
        create_test_file(tree.path(), "2020/trip/b.jpg", "two");
        create_test_file(tree.path(), ".hidden/c.jpg", "three");

        let sink = RecordingSink::default();
        let run = ScanRun::new("desk");
        let report = Scanner::new(db).scan(tree.path(), &run, &sink).await.unwrap();

        let events = sink.sorted();
        let paths: Vec<&str> = events.iter().map(|e| e.file_path.as_str()).collect();
        assert_eq!(paths, vec![".hidden/c.jpg", "2020/trip/b.jpg", "a.jpg"]);
        assert!(events.iter().all(|e| e.event_type == EventType::Create));
        assert!(events.iter().all(|e| e.time == run.timestamp));
        assert!(events.iter().all(|e| e.storage_location == "desk"));
        assert_eq!(events[2].fingerprint, digest("one"));

        assert_eq!(report.stats.files_seen, 3);
        assert_eq!(report.stats.files_created, 3);
        assert_eq!(report.stats.events_queued, 3);
        assert_eq!(report.stats.bytes_scanned, 11);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_classifies_against_catalog_state() {
        let (tree, _db_dir, db) = setup().await;
        create_test_file(tree.path(), "same.jpg", "same");
        create_test_file(tree.path(), "changed.jpg", "new");
        create_test_file(tree.path(), "back.jpg", "back");

        db.append_batch(&[
            FileEvent::new(EventType::Create, "same.jpg", 1, "t", digest("same")),
            FileEvent::new(EventType::Create, "changed.jpg", 1, "t", digest("old")),
            FileEvent::new(EventType::Create, "back.jpg", 1, "t", digest("back")),
            FileEvent::new(EventType::Delete, "back.jpg", 2, "t", digest("back")),
        ])
        .await
        .unwrap();

        let sink = RecordingSink::default();
        let report = Scanner::new(db)
            .scan(tree.path(), &ScanRun::new("t"), &sink)
            .await
            .unwrap();

        let events = sink.sorted();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].file_path, "back.jpg");
        assert_eq!(events[0].event_type, EventType::Create);
        assert_eq!(events[1].file_path, "changed.jpg");
        assert_eq!(events[1].event_type, EventType::Update);
        assert_eq!(events[1].fingerprint, digest("new"));

        assert_eq!(report.stats.files_unchanged, 1);
        assert_eq!(report.stats.files_updated, 1);
        assert_eq!(report.stats.files_created, 1);
    }

    #[tokio::test]
    async fn test_unreadable_file_gets_sentinel_and_scan_continues() {
        let (tree, _db_dir, db) = setup().await;
        create_test_file(tree.path(), "bad.jpg", "x");
        create_test_file(tree.path(), "good.jpg", "y");

        let sink = RecordingSink::default();
        let scanner = Scanner::with_config(db, Arc::new(PickyFingerprinter), ScanConfig::default());
        let report = scanner
            .scan(tree.path(), &ScanRun::new("t"), &sink)
            .await
            .unwrap();

        let events = sink.sorted();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].fingerprint, FINGERPRINT_UNAVAILABLE);
        assert_eq!(events[1].fingerprint, digest("y"));
        assert_eq!(report.stats.fingerprint_failures, 1);
    }

    #[tokio::test]
    async fn test_missing_root() {
        let (tree, _db_dir, db) = setup().await;
        let sink = RecordingSink::default();

        let result = Scanner::new(db)
            .scan(&tree.path().join("nope"), &ScanRun::new("t"), &sink)
            .await;
        assert!(matches!(result, Err(CatalogError::RootNotFound(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_not_followed() {
        let (tree, _db_dir, db) = setup().await;
        let outside = TempDir::new().unwrap();
        create_test_file(outside.path(), "elsewhere/x.jpg", "x");
        create_test_file(tree.path(), "real.jpg", "r");
        std::os::unix::fs::symlink(outside.path().join("elsewhere"), tree.path().join("link"))
            .unwrap();
        std::os::unix::fs::symlink(tree.path().join("real.jpg"), tree.path().join("alias.jpg"))
            .unwrap();

        let sink = RecordingSink::default();
        Scanner::new(db)
            .scan(tree.path(), &ScanRun::new("t"), &sink)
            .await
            .unwrap();

        let events = sink.sorted();
        let paths: Vec<&str> = events.iter().map(|e| e.file_path.as_str()).collect();
        assert_eq!(paths, vec!["real.jpg"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_paths_reported_not_cataloged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let (tree, _db_dir, db) = setup().await;
        create_test_file(tree.path(), "cafe.jpg", "c");
        fs::write(tree.path().join(OsStr::from_bytes(b"caf\xe9.jpg")), "x").unwrap();
        let bad_dir = tree.path().join(OsStr::from_bytes(b"d\xffr"));
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join("inner.jpg"), "i").unwrap();

        let sink = RecordingSink::default();
        let report = Scanner::new(db)
            .scan(tree.path(), &ScanRun::new("t"), &sink)
            .await
            .unwrap();

        let events = sink.sorted();
        let paths: Vec<&str> = events.iter().map(|e| e.file_path.as_str()).collect();
        assert_eq!(paths, vec!["cafe.jpg"]);
        // One error for the file, one for the directory; its contents are skipped
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.stats.walk_errors, 2);
        assert!(report
            .errors
            .iter()
            .all(|e| e.message == "path is not valid UTF-8"));
    }
}
