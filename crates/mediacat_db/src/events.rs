//! Event log operations: batch append and state queries.

use crate::error::{DbError, Result};
use crate::types::{EventType, FileEvent};
use crate::CatalogDb;
use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

/// Rows per INSERT statement. Five binds per row keeps every statement
/// well under SQLite's bound-parameter limit.
const INSERT_CHUNK_ROWS: usize = 100;

const EVENT_COLUMNS: &str = "event_type, file_path, time, storage_location, fingerprint";

const LATEST_EVENT_SQL: &str = r#"
    SELECT event_type, file_path, time, storage_location, fingerprint
    FROM file_events
    WHERE file_path = ?
    ORDER BY time DESC, id DESC
    LIMIT 1
"#;

const ALL_EVENTS_SQL: &str = r#"
    SELECT event_type, file_path, time, storage_location, fingerprint
    FROM file_events
    ORDER BY id
"#;

/// Newest event per path; ties on `time` go to the later insertion.
const LIVE_PATHS_SQL: &str = r#"
    SELECT file_path FROM (
        SELECT file_path, event_type,
               ROW_NUMBER() OVER (
                   PARTITION BY file_path ORDER BY time DESC, id DESC
               ) AS rn
        FROM file_events
    )
    WHERE rn = 1 AND event_type != 'delete'
    ORDER BY file_path
"#;

impl CatalogDb {
    /// Append events in one transaction.
    ///
    /// Either every event becomes visible or, on error, none do: the
    /// transaction is rolled back when it is dropped uncommitted.
    pub async fn append_batch(&self, events: &[FileEvent]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for chunk in events.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO file_events ({}) ", EVENT_COLUMNS));
            builder.push_values(chunk, |mut row, event| {
                row.push_bind(event.event_type.as_str())
                    .push_bind(event.file_path.as_str())
                    .push_bind(event.time)
                    .push_bind(event.storage_location.as_str())
                    .push_bind(event.fingerprint.as_str());
            });
            let result = builder.build().execute(&mut *tx).await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        debug!(rows = inserted, "Appended event batch");
        Ok(inserted)
    }

    /// Newest event recorded for `path`, if the catalog has ever seen it.
    pub async fn latest_event(&self, path: &str) -> Result<Option<FileEvent>> {
        let row = sqlx::query(LATEST_EVENT_SQL)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_event).transpose()
    }

    /// Stream every path whose newest event is not a delete.
    ///
    /// Covers the whole catalog, not one scan root. The stream reads from a
    /// single snapshot, so events appended while it is consumed are not seen.
    pub fn live_paths(&self) -> BoxStream<'_, Result<String>> {
        sqlx::query(LIVE_PATHS_SQL)
            .fetch(&self.pool)
            .map(|row| -> Result<String> {
                let row = row?;
                Ok(row.try_get::<String, _>("file_path")?)
            })
            .boxed()
    }

    /// Stream the full history in insertion order.
    pub fn all_events(&self) -> BoxStream<'_, Result<FileEvent>> {
        sqlx::query(ALL_EVENTS_SQL)
            .fetch(&self.pool)
            .map(|row| -> Result<FileEvent> { row_to_event(&row?) })
            .boxed()
    }

    /// Total number of events in the catalog.
    pub async fn event_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM file_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    /// Number of distinct paths the catalog has ever seen.
    pub async fn path_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(DISTINCT file_path) AS n FROM file_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

fn row_to_event(row: &SqliteRow) -> Result<FileEvent> {
    let raw_type: String = row.try_get("event_type")?;
    let event_type = EventType::parse(&raw_type).ok_or_else(|| {
        DbError::invalid_state(format!("unknown event type '{}' in catalog", raw_type))
    })?;

    Ok(FileEvent {
        event_type,
        file_path: row.try_get("file_path")?,
        time: row.try_get("time")?,
        storage_location: row.try_get("storage_location")?,
        fingerprint: row.try_get("fingerprint")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tempfile::TempDir;

    async fn create_test_db() -> (TempDir, CatalogDb) {
        let tmp = TempDir::new().unwrap();
        let db = CatalogDb::open(tmp.path().join("catalog.sqlite3"))
            .await
            .unwrap();
        (tmp, db)
    }

    fn event(ty: EventType, path: &str, time: i64, fingerprint: &str) -> FileEvent {
        FileEvent::new(ty, path, time, "test", fingerprint)
    }

    #[tokio::test]
    async fn test_append_and_latest_event() {
        let (_tmp, db) = create_test_db().await;

        let inserted = db
            .append_batch(&[
                event(EventType::Create, "a.jpg", 100, "f1"),
                event(EventType::Update, "a.jpg", 200, "f2"),
                event(EventType::Create, "b.jpg", 100, "f3"),
            ])
            .await
            .unwrap();
        assert_eq!(inserted, 3);

        let latest = db.latest_event("a.jpg").await.unwrap().unwrap();
        assert_eq!(latest.event_type, EventType::Update);
        assert_eq!(latest.fingerprint, "f2");

        assert!(db.latest_event("missing.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_event_prefers_newer_time_over_insertion_order() {
        let (_tmp, db) = create_test_db().await;

        db.append_batch(&[event(EventType::Update, "a.jpg", 300, "new")])
            .await
            .unwrap();
        db.append_batch(&[event(EventType::Create, "a.jpg", 100, "old")])
            .await
            .unwrap();

        let latest = db.latest_event("a.jpg").await.unwrap().unwrap();
        assert_eq!(latest.fingerprint, "new");
    }

    #[tokio::test]
    async fn test_same_timestamp_ties_go_to_later_insertion() {
        let (_tmp, db) = create_test_db().await;

        db.append_batch(&[
            event(EventType::Create, "a.jpg", 100, "f1"),
            event(EventType::Delete, "a.jpg", 100, "f1"),
        ])
        .await
        .unwrap();

        let latest = db.latest_event("a.jpg").await.unwrap().unwrap();
        assert_eq!(latest.event_type, EventType::Delete);
    }

    #[tokio::test]
    async fn test_live_paths_follow_latest_event() {
        let (_tmp, db) = create_test_db().await;

        db.append_batch(&[
            event(EventType::Create, "kept.jpg", 100, "f1"),
            event(EventType::Create, "gone.jpg", 100, "f2"),
            event(EventType::Create, "back.jpg", 100, "f3"),
        ])
        .await
        .unwrap();
        db.append_batch(&[
            event(EventType::Delete, "gone.jpg", 200, "f2"),
            event(EventType::Delete, "back.jpg", 200, "f3"),
        ])
        .await
        .unwrap();
        db.append_batch(&[event(EventType::Create, "back.jpg", 300, "f4")])
            .await
            .unwrap();

        let live: Vec<String> = db.live_paths().try_collect().await.unwrap();
        assert_eq!(live, vec!["back.jpg".to_string(), "kept.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_all_events_in_insertion_order() {
        let (_tmp, db) = create_test_db().await;

        db.append_batch(&[
            event(EventType::Create, "z.jpg", 100, "f1"),
            event(EventType::Create, "a.jpg", 100, "f2"),
        ])
        .await
        .unwrap();
        db.append_batch(&[event(EventType::Update, "z.jpg", 50, "f3")])
            .await
            .unwrap();

        let events: Vec<FileEvent> = db.all_events().try_collect().await.unwrap();
        let paths: Vec<&str> = events.iter().map(|e| e.file_path.as_str()).collect();
        assert_eq!(paths, vec!["z.jpg", "a.jpg", "z.jpg"]);
        assert_eq!(events[2].event_type, EventType::Update);
        assert_eq!(db.event_count().await.unwrap(), 3);
        assert_eq!(db.path_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let (_tmp, db) = create_test_db().await;
        assert_eq!(db.append_batch(&[]).await.unwrap(), 0);
        assert_eq!(db.event_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_large_batch_spans_insert_chunks() {
        let (_tmp, db) = create_test_db().await;

        let events: Vec<FileEvent> = (0..(INSERT_CHUNK_ROWS * 2 + 7))
            .map(|i| event(EventType::Create, &format!("f{:04}.jpg", i), 100, "fp"))
            .collect();
        let inserted = db.append_batch(&events).await.unwrap();

        assert_eq!(inserted as usize, events.len());
        assert_eq!(db.event_count().await.unwrap() as usize, events.len());
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_nothing_visible() {
        let (_tmp, db) = create_test_db().await;

        sqlx::query(
            r#"CREATE TRIGGER reject_poison BEFORE INSERT ON file_events
            WHEN NEW.file_path = 'poison'
            BEGIN SELECT RAISE(ABORT, 'poisoned path'); END"#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        // The poisoned row sits in a later chunk than the first valid rows
        let mut events: Vec<FileEvent> = (0..(INSERT_CHUNK_ROWS + 5))
            .map(|i| event(EventType::Create, &format!("ok{}.jpg", i), 100, "fp"))
            .collect();
        events.push(event(EventType::Create, "poison", 100, "fp"));

        let result = db.append_batch(&events).await;
        assert!(matches!(result, Err(DbError::Sqlx(_))));
        assert_eq!(db.event_count().await.unwrap(), 0);
        assert!(db.latest_event("ok0.jpg").await.unwrap().is_none());
    }
}
