//! SQLite-based vector store implementation.
//!
//! Vectors are kept as nullable little-endian `f32` blobs on the segment row;
//! similarity is computed in Rust by a full scan. Every write commits on its
//! own, so an interrupted episode keeps whatever segments were written.

use super::{NewSegment, Segment, SegmentId, SegmentVisitor, VectorStore};
use crate::error::{PodsearchError, Result};
use crate::vector::Vector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS shows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        description TEXT,
        publisher TEXT,
        website TEXT,
        rss_feed TEXT,
        last_updated TEXT
    );

    CREATE TABLE IF NOT EXISTS episodes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        external_id TEXT NOT NULL UNIQUE,
        show_id INTEGER NOT NULL REFERENCES shows(id),
        title TEXT NOT NULL,
        description TEXT,
        audio_url TEXT,
        published_at TEXT,
        duration INTEGER NOT NULL DEFAULT 0,
        transcript_status TEXT NOT NULL DEFAULT 'pending',
        last_updated TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_episodes_show_status ON episodes(show_id, transcript_status);

    CREATE TABLE IF NOT EXISTS segments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        episode_id INTEGER NOT NULL REFERENCES episodes(id),
        start_time INTEGER NOT NULL,
        end_time INTEGER NOT NULL,
        text TEXT NOT NULL,
        vector BLOB,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_segments_episode_id ON segments(episode_id);

    CREATE TABLE IF NOT EXISTS api_tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        token TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_used TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        requests_count INTEGER NOT NULL DEFAULT 0
    );
"#;

const SEGMENT_COLUMNS: &str = "id, episode_id, start_time, end_time, text, vector, created_at";

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

/// Segment row with its vector blob still encoded.
struct SegmentRow {
    id: SegmentId,
    episode_id: i64,
    start_time: u32,
    end_time: u32,
    text: String,
    vector: Option<Vec<u8>>,
    created_at: String,
}

impl SegmentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            episode_id: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            text: row.get(4)?,
            vector: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Segment> {
        let vector = self.vector.as_deref().map(Vector::from_bytes).transpose()?;
        Ok(Segment {
            id: self.id,
            episode_id: self.episode_id,
            start_time: self.start_time,
            end_time: self.end_time,
            text: self.text,
            vector,
            created_at: parse_timestamp(&self.created_at).unwrap_or_else(Utc::now),
        })
    }
}

/// Parse an RFC 3339 column value.
pub(super) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl SqliteVectorStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets the API server read while an update cycle writes.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn, &format!("{:?}", path))
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, "memory")
    }

    fn init(conn: Connection, location: &str) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Initialized SQLite store at {}", location);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(super) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PodsearchError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self, segment), fields(episode_id = segment.episode_id))]
    async fn insert_segment(&self, segment: &NewSegment) -> Result<SegmentId> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO segments (episode_id, start_time, end_time, text, vector, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                segment.episode_id,
                segment.start_time,
                segment.end_time,
                segment.text,
                segment.vector.as_ref().map(Vector::to_bytes),
                Utc::now().to_rfc3339(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        debug!("Inserted segment {}", id);
        Ok(id)
    }

    #[instrument(skip(self, vector))]
    async fn store(&self, segment_id: SegmentId, vector: &Vector) -> Result<()> {
        let conn = self.conn()?;

        let updated = conn.execute(
            "UPDATE segments SET vector = ?1 WHERE id = ?2 AND vector IS NULL",
            params![vector.to_bytes(), segment_id],
        )?;

        if updated == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM segments WHERE id = ?1)",
                params![segment_id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                PodsearchError::VectorStore(format!("Segment {} already has a vector", segment_id))
            } else {
                PodsearchError::NotFound(format!("Segment {}", segment_id))
            });
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, segment_id: SegmentId) -> Result<Option<Vector>> {
        let conn = self.conn()?;

        let blob: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT vector FROM segments WHERE id = ?1",
                params![segment_id],
                |row| row.get(0),
            )
            .optional()?;

        match blob {
            None => Err(PodsearchError::NotFound(format!("Segment {}", segment_id))),
            Some(None) => Ok(None),
            Some(Some(bytes)) => Ok(Some(Vector::from_bytes(&bytes)?)),
        }
    }

    #[instrument(skip(self, visitor))]
    async fn scan_all(&self, visitor: &mut SegmentVisitor<'_>) -> Result<usize> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!("SELECT {} FROM segments ORDER BY id", SEGMENT_COLUMNS))?;
        let rows = stmt.query_map([], SegmentRow::from_row)?;

        let mut visited = 0;
        for row in rows {
            let row = row?;
            let id = row.id;
            match row.decode() {
                Ok(segment) => {
                    visitor(segment)?;
                    visited += 1;
                }
                Err(e) => warn!("Skipping segment {} with unreadable vector: {}", id, e),
            }
        }

        debug!("Scanned {} segments", visited);
        Ok(visited)
    }

    #[instrument(skip(self))]
    async fn segments_for_episode(&self, episode_id: i64) -> Result<Vec<Segment>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM segments WHERE episode_id = ?1 ORDER BY id",
            SEGMENT_COLUMNS
        ))?;

        let rows = stmt.query_map(params![episode_id], SegmentRow::from_row)?;
        let segments = rows
            .map(|row| row.map_err(PodsearchError::from).and_then(SegmentRow::decode))
            .collect::<Result<Vec<_>>>()?;
        Ok(segments)
    }

    #[instrument(skip(self))]
    async fn delete_by_episode(&self, episode_id: i64) -> Result<usize> {
        let conn = self.conn()?;

        let deleted = conn.execute("DELETE FROM segments WHERE episode_id = ?1", params![episode_id])?;

        info!("Deleted {} segments for episode {}", deleted, episode_id);
        Ok(deleted)
    }

    async fn segment_count(&self) -> Result<usize> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM segments", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::{NewEpisode, NewShow};

    fn seeded_store() -> (SqliteVectorStore, i64) {
        let store = SqliteVectorStore::in_memory().unwrap();
        let show_id = store.upsert_show(&NewShow::new("show-1", "Test Show")).unwrap();
        let episode_id = store
            .upsert_episode(&NewEpisode::new("ep-1", show_id, "Episode One", 120))
            .unwrap();
        (store, episode_id)
    }

    fn new_segment(episode_id: i64, text: &str, vector: Option<Vec<f32>>) -> NewSegment {
        NewSegment {
            episode_id,
            start_time: 0,
            end_time: 10,
            text: text.to_string(),
            vector: vector.map(Vector::new),
        }
    }

    #[tokio::test]
    async fn test_insert_and_load() {
        let (store, episode_id) = seeded_store();

        let with = store
            .insert_segment(&new_segment(episode_id, "hello", Some(vec![0.5, -1.25, 3.0])))
            .await
            .unwrap();
        let without = store.insert_segment(&new_segment(episode_id, "world", None)).await.unwrap();

        assert_eq!(
            store.load(with).await.unwrap(),
            Some(Vector::new(vec![0.5, -1.25, 3.0]))
        );
        assert_eq!(store.load(without).await.unwrap(), None);
        assert!(matches!(store.load(9999).await, Err(PodsearchError::NotFound(_))));
        assert_eq!(store.segment_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_zero_vector_is_not_absent() {
        let (store, episode_id) = seeded_store();

        let id = store
            .insert_segment(&new_segment(episode_id, "silence", Some(vec![0.0, 0.0])))
            .await
            .unwrap();

        assert_eq!(store.load(id).await.unwrap(), Some(Vector::new(vec![0.0, 0.0])));
    }

    #[tokio::test]
    async fn test_store_is_write_once() {
        let (store, episode_id) = seeded_store();
        let id = store.insert_segment(&new_segment(episode_id, "late", None)).await.unwrap();

        store.store(id, &Vector::new(vec![1.0, 2.0])).await.unwrap();
        assert_eq!(store.load(id).await.unwrap(), Some(Vector::new(vec![1.0, 2.0])));

        let err = store.store(id, &Vector::new(vec![3.0, 4.0])).await.unwrap_err();
        assert!(matches!(err, PodsearchError::VectorStore(_)));
        assert!(matches!(
            store.store(4242, &Vector::new(vec![1.0])).await,
            Err(PodsearchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_all_in_insertion_order() {
        let (store, episode_id) = seeded_store();
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            let vector = if i == 1 { None } else { Some(vec![i as f32, 1.0]) };
            store.insert_segment(&new_segment(episode_id, text, vector)).await.unwrap();
        }

        let mut seen = Vec::new();
        let count = store
            .scan_all(&mut |segment: Segment| {
                seen.push((segment.text, segment.vector.is_some()));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), true),
                ("b".to_string(), false),
                ("c".to_string(), true)
            ]
        );
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("podcasts.db");

        let segment_id = {
            let store = SqliteVectorStore::new(&path).unwrap();
            let show_id = store.upsert_show(&NewShow::new("s", "Show")).unwrap();
            let episode_id = store.upsert_episode(&NewEpisode::new("e", show_id, "Ep", 60)).unwrap();
            store
                .insert_segment(&new_segment(episode_id, "kept", Some(vec![0.25, 0.75])))
                .await
                .unwrap()
        };

        let store = SqliteVectorStore::new(&path).unwrap();
        assert_eq!(
            store.load(segment_id).await.unwrap(),
            Some(Vector::new(vec![0.25, 0.75]))
        );
    }

    #[tokio::test]
    async fn test_delete_by_episode() {
        let (store, episode_id) = seeded_store();
        store.insert_segment(&new_segment(episode_id, "x", None)).await.unwrap();
        store.insert_segment(&new_segment(episode_id, "y", None)).await.unwrap();

        assert_eq!(store.delete_by_episode(episode_id).await.unwrap(), 2);
        assert!(store.segments_for_episode(episode_id).await.unwrap().is_empty());
    }
}
