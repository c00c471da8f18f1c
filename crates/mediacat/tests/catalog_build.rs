//! Catalog builds against real trees and real SQLite files.

use futures::TryStreamExt;
use mediacat::{build_catalog, CatalogConfig, CatalogDb, CatalogError, EventType, FileEvent};
use std::fs;
use tempfile::TempDir;

struct Fixture {
    tree: TempDir,
    _db_dir: TempDir,
    db: CatalogDb,
}

impl Fixture {
    async fn new() -> Self {
        let tree = TempDir::new().unwrap();
        let db_dir = TempDir::new().unwrap();
        let db = CatalogDb::open(db_dir.path().join("catalog.sqlite3"))
            .await
            .unwrap();
        Self {
            tree,
            _db_dir: db_dir,
            db,
        }
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.tree.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn remove(&self, rel: &str) {
        fs::remove_file(self.tree.path().join(rel)).unwrap();
    }

    async fn build(&self) -> mediacat::BuildReport {
        build_catalog(self.tree.path(), &self.db, &CatalogConfig::default())
            .await
            .unwrap()
    }

    async fn history(&self, path: &str) -> Vec<FileEvent> {
        self.db
            .all_events()
            .try_filter(|e| futures::future::ready(e.file_path == path))
            .try_collect()
            .await
            .unwrap()
    }

    async fn live(&self) -> Vec<String> {
        self.db.live_paths().try_collect().await.unwrap()
    }
}

fn digest(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_first_build_creates_every_file() {
    let fx = Fixture::new().await;
    fx.write("a.jpg", "a");
    fx.write("trip/b.jpg", "b");

    let report = fx.build().await;

    assert_eq!(report.scan.stats.files_created, 2);
    assert_eq!(report.events_written(), 2);
    assert_eq!(report.deletions.as_ref().unwrap().deletes_queued, 0);
    assert_eq!(fx.db.event_count().await.unwrap(), 2);
    assert_eq!(fx.live().await, vec!["a.jpg".to_string(), "trip/b.jpg".to_string()]);

    let events = fx.history("trip/b.jpg").await;
    assert_eq!(events[0].time, report.run.timestamp);
    assert_eq!(events[0].storage_location, "local");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rescan_of_unchanged_tree_is_idempotent() {
    let fx = Fixture::new().await;
    fx.write("a.jpg", "a");
    fx.write("b.jpg", "b");
    fx.build().await;

    let second = fx.build().await;

    assert_eq!(second.scan.stats.files_unchanged, 2);
    assert_eq!(second.scan.stats.events_queued, 0);
    assert_eq!(second.queue.events_queued, 0);
    assert_eq!(fx.db.event_count().await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_content_change_appends_update() {
    let fx = Fixture::new().await;
    fx.write("a.jpg", "v1");
    fx.build().await;

    fx.write("a.jpg", "v2");
    let report = fx.build().await;

    assert_eq!(report.scan.stats.files_updated, 1);
    let history = fx.history("a.jpg").await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].event_type, EventType::Create);
    assert_eq!(history[0].fingerprint, digest("v1"));
    assert_eq!(history[1].event_type, EventType::Update);
    assert_eq!(history[1].fingerprint, digest("v2"));

    let latest = fx.db.latest_event("a.jpg").await.unwrap().unwrap();
    assert_eq!(latest, history[1]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_removed_file_gets_tombstone() {
    let fx = Fixture::new().await;
    fx.write("keep.jpg", "k");
    fx.write("drop.jpg", "d");
    fx.build().await;

    fx.remove("drop.jpg");
    let report = fx.build().await;

    assert_eq!(report.deletions.unwrap().deletes_queued, 1);
    let latest = fx.db.latest_event("drop.jpg").await.unwrap().unwrap();
    assert_eq!(latest.event_type, EventType::Delete);
    assert_eq!(latest.fingerprint, digest("d"));
    assert_eq!(fx.live().await, vec!["keep.jpg".to_string()]);

    // A second pass has nothing left to tombstone
    let again = fx.build().await;
    assert_eq!(again.deletions.unwrap().deletes_queued, 0);
    assert_eq!(fx.db.event_count().await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_recreated_file_is_a_create_not_an_update() {
    let fx = Fixture::new().await;
    fx.write("a.jpg", "first");
    fx.build().await;
    fx.remove("a.jpg");
    fx.build().await;

    fx.write("a.jpg", "second");
    let report = fx.build().await;

    assert_eq!(report.scan.stats.files_created, 1);
    assert_eq!(report.scan.stats.files_updated, 0);
    let kinds: Vec<EventType> = fx
        .history("a.jpg")
        .await
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(
        kinds,
        vec![EventType::Create, EventType::Delete, EventType::Create]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deletion_detection_can_be_disabled() {
    let fx = Fixture::new().await;
    fx.write("a.jpg", "a");
    fx.build().await;
    fx.remove("a.jpg");

    let mut config = CatalogConfig::default();
    config.scan.detect_deletions = false;
    let report = build_catalog(fx.tree.path(), &fx.db, &config).await.unwrap();

    assert!(report.deletions.is_none());
    assert_eq!(fx.live().await, vec!["a.jpg".to_string()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_many_files_with_small_batches() {
    let fx = Fixture::new().await;
    for i in 0..300 {
        fx.write(&format!("d{}/f{}.bin", i % 7, i), &format!("content {}", i));
    }

    let mut config = CatalogConfig::default();
    config.pipeline.batch_size = 16;
    let report = build_catalog(fx.tree.path(), &fx.db, &config).await.unwrap();

    assert_eq!(report.scan.stats.files_created, 300);
    assert_eq!(report.queue.events_flushed, 300);
    assert!(report.queue.batches >= 300 / 16);
    assert_eq!(fx.db.event_count().await.unwrap(), 300);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_flush_aborts_build_without_partial_batch() {
    let fx = Fixture::new().await;
    fx.write("a.jpg", "a");
    fx.write("b.jpg", "b");
    fx.write("poison", "p");

    sqlx::query(
        r#"CREATE TRIGGER reject_poison BEFORE INSERT ON file_events
        WHEN NEW.file_path = 'poison'
        BEGIN SELECT RAISE(ABORT, 'poisoned path'); END"#,
    )
    .execute(fx.db.pool())
    .await
    .unwrap();

    // Only the explicit flush writes, so all three files share one batch
    let mut config = CatalogConfig::default();
    config.pipeline.periodic_flush_interval_ms = 60_000;
    let result = build_catalog(fx.tree.path(), &fx.db, &config).await;

    assert!(matches!(result, Err(CatalogError::Persistence(_))));
    assert_eq!(fx.db.event_count().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_root_is_rejected() {
    let fx = Fixture::new().await;
    let result = build_catalog(
        &fx.tree.path().join("missing"),
        &fx.db,
        &CatalogConfig::default(),
    )
    .await;
    assert!(matches!(result, Err(CatalogError::RootNotFound(_))));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_non_utf8_name_never_churns() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let fx = Fixture::new().await;
    fx.write("plain.jpg", "p");
    fs::write(fx.tree.path().join(OsStr::from_bytes(b"caf\xe9.jpg")), "x").unwrap();

    for _ in 0..3 {
        let report = fx.build().await;
        assert_eq!(report.scan.errors.len(), 1);
        assert_eq!(report.deletions.unwrap().deletes_queued, 0);
    }

    assert_eq!(fx.db.event_count().await.unwrap(), 1);
    assert_eq!(fx.live().await, vec!["plain.jpg".to_string()]);
}
