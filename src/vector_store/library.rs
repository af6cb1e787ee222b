//! Show, episode and API-token records kept alongside the segments.
//!
//! These are not part of the [`VectorStore`](super::VectorStore) trait; the
//! orchestrator and the HTTP API use them directly on [`SqliteVectorStore`].

use super::sqlite::parse_timestamp;
use super::{ApiToken, Episode, Show, SqliteVectorStore, TranscriptStatus};
use crate::catalog::EpisodeDetails;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SHOW_COLUMNS: &str = "id, external_id, title, description, publisher, website, rss_feed, last_updated";

const EPISODE_COLUMNS: &str = "id, external_id, show_id, title, description, audio_url, published_at, \
                               duration, transcript_status, last_updated";

const TOKEN_COLUMNS: &str = "id, token, name, created_at, last_used, is_active, requests_count";

/// Show fields supplied when tracking a podcast.
#[derive(Debug, Clone, Default)]
pub struct NewShow {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub website: Option<String>,
    pub rss_feed: Option<String>,
}

impl NewShow {
    pub fn new(external_id: &str, title: &str) -> Self {
        Self {
            external_id: external_id.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }
}

/// Episode fields supplied when tracking an episode.
#[derive(Debug, Clone, Default)]
pub struct NewEpisode {
    pub external_id: String,
    pub show_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub audio_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub duration: u32,
}

impl NewEpisode {
    pub fn new(external_id: &str, show_id: i64, title: &str, duration: u32) -> Self {
        Self {
            external_id: external_id.to_string(),
            show_id,
            title: title.to_string(),
            duration,
            ..Default::default()
        }
    }
}

fn optional_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value.as_deref().and_then(parse_timestamp)
}

fn show_from_row(row: &Row<'_>) -> rusqlite::Result<Show> {
    Ok(Show {
        id: row.get(0)?,
        external_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        publisher: row.get(4)?,
        website: row.get(5)?,
        rss_feed: row.get(6)?,
        last_updated: optional_timestamp(row.get(7)?),
    })
}

fn episode_from_row(row: &Row<'_>) -> rusqlite::Result<Episode> {
    let status: String = row.get(8)?;
    let transcript_status = status
        .parse::<TranscriptStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, e.into()))?;

    Ok(Episode {
        id: row.get(0)?,
        external_id: row.get(1)?,
        show_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        audio_url: row.get(5)?,
        published_at: optional_timestamp(row.get(6)?),
        duration: row.get(7)?,
        transcript_status,
        last_updated: optional_timestamp(row.get(9)?),
    })
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<ApiToken> {
    let created_at: String = row.get(3)?;
    Ok(ApiToken {
        id: row.get(0)?,
        token: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        last_used: optional_timestamp(row.get(4)?),
        is_active: row.get(5)?,
        requests_count: row.get(6)?,
    })
}

// Shows
impl SqliteVectorStore {
    /// Insert a show or refresh its metadata. Returns the row id.
    #[instrument(skip(self, show), fields(external_id = %show.external_id))]
    pub fn upsert_show(&self, show: &NewShow) -> Result<i64> {
        let conn = self.conn()?;

        let id = conn.query_row(
            r#"
            INSERT INTO shows (external_id, title, description, publisher, website, rss_feed, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(external_id) DO UPDATE SET
                title = excluded.title,
                description = COALESCE(excluded.description, shows.description),
                publisher = COALESCE(excluded.publisher, shows.publisher),
                website = COALESCE(excluded.website, shows.website),
                rss_feed = COALESCE(excluded.rss_feed, shows.rss_feed)
            RETURNING id
            "#,
            params![
                show.external_id,
                show.title,
                show.description,
                show.publisher,
                show.website,
                show.rss_feed,
                Utc::now().to_rfc3339(),
            ],
            |row| row.get(0),
        )?;

        debug!("Upserted show {}", id);
        Ok(id)
    }

    pub fn get_show(&self, show_id: i64) -> Result<Option<Show>> {
        let conn = self.conn()?;
        let show = conn
            .query_row(
                &format!("SELECT {} FROM shows WHERE id = ?1", SHOW_COLUMNS),
                params![show_id],
                show_from_row,
            )
            .optional()?;
        Ok(show)
    }

    pub fn get_show_by_external_id(&self, external_id: &str) -> Result<Option<Show>> {
        let conn = self.conn()?;
        let show = conn
            .query_row(
                &format!("SELECT {} FROM shows WHERE external_id = ?1", SHOW_COLUMNS),
                params![external_id],
                show_from_row,
            )
            .optional()?;
        Ok(show)
    }

    pub fn list_shows(&self) -> Result<Vec<Show>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM shows ORDER BY title", SHOW_COLUMNS))?;
        let shows = stmt.query_map([], show_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(shows)
    }

    /// Stamp a show's `last_updated` after an update cycle.
    pub fn touch_show(&self, show_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE shows SET last_updated = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), show_id],
        )?;
        Ok(())
    }
}

// Episodes
impl SqliteVectorStore {
    /// Insert an episode as `pending`, or refresh metadata of a known one
    /// without touching its transcript status. Returns the row id.
    #[instrument(skip(self, episode), fields(external_id = %episode.external_id))]
    pub fn upsert_episode(&self, episode: &NewEpisode) -> Result<i64> {
        let conn = self.conn()?;

        let id = conn.query_row(
            r#"
            INSERT INTO episodes
            (external_id, show_id, title, description, audio_url, published_at, duration,
             transcript_status, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)
            ON CONFLICT(external_id) DO UPDATE SET
                title = excluded.title,
                description = COALESCE(excluded.description, episodes.description),
                audio_url = COALESCE(excluded.audio_url, episodes.audio_url),
                published_at = COALESCE(excluded.published_at, episodes.published_at),
                duration = excluded.duration
            RETURNING id
            "#,
            params![
                episode.external_id,
                episode.show_id,
                episode.title,
                episode.description,
                episode.audio_url,
                episode.published_at.map(|dt| dt.to_rfc3339()),
                episode.duration,
                Utc::now().to_rfc3339(),
            ],
            |row| row.get(0),
        )?;

        debug!("Upserted episode {}", id);
        Ok(id)
    }

    pub fn get_episode(&self, episode_id: i64) -> Result<Option<Episode>> {
        let conn = self.conn()?;
        let episode = conn
            .query_row(
                &format!("SELECT {} FROM episodes WHERE id = ?1", EPISODE_COLUMNS),
                params![episode_id],
                episode_from_row,
            )
            .optional()?;
        Ok(episode)
    }

    pub fn get_episode_by_external_id(&self, external_id: &str) -> Result<Option<Episode>> {
        let conn = self.conn()?;
        let episode = conn
            .query_row(
                &format!("SELECT {} FROM episodes WHERE external_id = ?1", EPISODE_COLUMNS),
                params![external_id],
                episode_from_row,
            )
            .optional()?;
        Ok(episode)
    }

    /// Episodes of a show, newest first.
    pub fn list_episodes(&self, show_id: i64) -> Result<Vec<Episode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM episodes WHERE show_id = ?1 ORDER BY published_at DESC, id",
            EPISODE_COLUMNS
        ))?;
        let episodes = stmt
            .query_map(params![show_id], episode_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(episodes)
    }

    /// Episodes of a show waiting for transcript processing: never run, or
    /// failed on an earlier cycle.
    pub fn pending_episodes(&self, show_id: i64) -> Result<Vec<Episode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM episodes WHERE show_id = ?1 AND transcript_status IN ('pending', 'failed') ORDER BY id",
            EPISODE_COLUMNS
        ))?;
        let episodes = stmt
            .query_map(params![show_id], episode_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(episodes)
    }

    /// Overwrite episode metadata with whatever the catalog returned.
    pub fn apply_episode_details(&self, episode_id: i64, details: &EpisodeDetails) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE episodes SET
                title = COALESCE(?1, title),
                description = COALESCE(?2, description),
                audio_url = COALESCE(?3, audio_url),
                published_at = COALESCE(?4, published_at),
                duration = COALESCE(?5, duration)
            WHERE id = ?6
            "#,
            params![
                details.title,
                details.description,
                details.audio_url,
                details.published_at.map(|dt| dt.to_rfc3339()),
                details.duration,
                episode_id,
            ],
        )?;
        Ok(())
    }

    /// Move an episode from `pending` or `failed` to `processing`.
    ///
    /// Segments left behind by a failed run are deleted in the same
    /// transaction, so a retry starts from an empty set. Returns false when
    /// the episode is processing or completed, which is how concurrent runs
    /// for the same episode are kept out.
    #[instrument(skip(self))]
    pub fn claim_episode(&self, episode_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let updated = tx.execute(
            "UPDATE episodes SET transcript_status = 'processing', last_updated = ?1 \
             WHERE id = ?2 AND transcript_status IN ('pending', 'failed')",
            params![Utc::now().to_rfc3339(), episode_id],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        let leftover = tx.execute("DELETE FROM segments WHERE episode_id = ?1", params![episode_id])?;
        tx.commit()?;

        if leftover > 0 {
            info!("Removed {} segments of an earlier run of episode {}", leftover, episode_id);
        }
        Ok(true)
    }

    pub fn set_episode_status(&self, episode_id: i64, status: TranscriptStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE episodes SET transcript_status = ?1 WHERE id = ?2",
            params![status.as_str(), episode_id],
        )?;
        debug!("Episode {} -> {}", episode_id, status);
        Ok(())
    }

    /// Mark an episode completed and stamp `last_updated`.
    pub fn complete_episode(&self, episode_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE episodes SET transcript_status = 'completed', last_updated = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), episode_id],
        )?;
        Ok(())
    }

    /// Drop an episode's segments and put it back to `pending`.
    #[instrument(skip(self))]
    pub fn reset_episode(&self, episode_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let deleted = tx.execute("DELETE FROM segments WHERE episode_id = ?1", params![episode_id])?;
        tx.execute(
            "UPDATE episodes SET transcript_status = 'pending' WHERE id = ?1",
            params![episode_id],
        )?;
        tx.commit()?;

        info!("Reset episode {} ({} segments removed)", episode_id, deleted);
        Ok(deleted)
    }

    /// Episode and show a segment belongs to, for presenting search results.
    pub fn episode_context(&self, episode_id: i64) -> Result<Option<(Episode, Show)>> {
        let Some(episode) = self.get_episode(episode_id)? else {
            return Ok(None);
        };
        let show = self.get_show(episode.show_id)?;
        Ok(show.map(|show| (episode, show)))
    }
}

// API tokens
impl SqliteVectorStore {
    /// Issue a new active token.
    pub fn create_token(&self, name: &str) -> Result<ApiToken> {
        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let conn = self.conn()?;

        let created = conn.query_row(
            &format!(
                "INSERT INTO api_tokens (token, name, created_at) VALUES (?1, ?2, ?3) RETURNING {}",
                TOKEN_COLUMNS
            ),
            params![token, name, Utc::now().to_rfc3339()],
            token_from_row,
        )?;

        info!("Created API token '{}'", name);
        Ok(created)
    }

    /// Check a presented token and record its use.
    ///
    /// Returns `None` for unknown or revoked tokens.
    pub fn authenticate_token(&self, token: &str) -> Result<Option<ApiToken>> {
        let conn = self.conn()?;

        let found = conn
            .query_row(
                &format!(
                    "UPDATE api_tokens SET last_used = ?1, requests_count = requests_count + 1 \
                     WHERE token = ?2 AND is_active = 1 RETURNING {}",
                    TOKEN_COLUMNS
                ),
                params![Utc::now().to_rfc3339(), token],
                token_from_row,
            )
            .optional()?;

        Ok(found)
    }

    pub fn list_tokens(&self) -> Result<Vec<ApiToken>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM api_tokens ORDER BY id", TOKEN_COLUMNS))?;
        let tokens = stmt.query_map([], token_from_row)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tokens)
    }

    /// Deactivate every token with this name. Returns how many were revoked.
    pub fn revoke_token(&self, name: &str) -> Result<usize> {
        let conn = self.conn()?;
        let revoked = conn.execute(
            "UPDATE api_tokens SET is_active = 0 WHERE name = ?1 AND is_active = 1",
            params![name],
        )?;
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::{NewSegment, VectorStore};

    #[test]
    fn test_upsert_show_is_idempotent() {
        let store = SqliteVectorStore::in_memory().unwrap();

        let first = store.upsert_show(&NewShow::new("abc", "Old Title")).unwrap();
        let second = store.upsert_show(&NewShow::new("abc", "New Title")).unwrap();

        assert_eq!(first, second);
        let shows = store.list_shows().unwrap();
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].title, "New Title");
    }

    #[test]
    fn test_upsert_episode_keeps_status() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let show_id = store.upsert_show(&NewShow::new("s", "Show")).unwrap();
        let id = store.upsert_episode(&NewEpisode::new("e", show_id, "Ep", 100)).unwrap();

        store.complete_episode(id).unwrap();
        store.upsert_episode(&NewEpisode::new("e", show_id, "Ep (edited)", 110)).unwrap();

        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(episode.title, "Ep (edited)");
        assert_eq!(episode.duration, 110);
        assert_eq!(episode.transcript_status, TranscriptStatus::Completed);
        assert!(episode.last_updated.is_some());
    }

    #[test]
    fn test_claim_only_from_pending() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let show_id = store.upsert_show(&NewShow::new("s", "Show")).unwrap();
        let id = store.upsert_episode(&NewEpisode::new("e", show_id, "Ep", 100)).unwrap();

        assert_eq!(store.pending_episodes(show_id).unwrap().len(), 1);
        assert!(store.claim_episode(id).unwrap());
        assert!(!store.claim_episode(id).unwrap());
        assert!(store.pending_episodes(show_id).unwrap().is_empty());

        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(episode.transcript_status, TranscriptStatus::Processing);

        store.complete_episode(id).unwrap();
        assert!(!store.claim_episode(id).unwrap());
    }

    #[tokio::test]
    async fn test_failed_episode_is_claimable_and_cleared() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let show_id = store.upsert_show(&NewShow::new("s", "Show")).unwrap();
        let id = store.upsert_episode(&NewEpisode::new("e", show_id, "Ep", 100)).unwrap();

        assert!(store.claim_episode(id).unwrap());
        store
            .insert_segment(&NewSegment {
                episode_id: id,
                start_time: 0,
                end_time: 50,
                text: "half written".to_string(),
                vector: None,
            })
            .await
            .unwrap();
        store.set_episode_status(id, TranscriptStatus::Failed).unwrap();

        let pending = store.pending_episodes(show_id).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].transcript_status, TranscriptStatus::Failed);

        assert!(store.claim_episode(id).unwrap());
        assert_eq!(store.segment_count().await.unwrap(), 0);
        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(episode.transcript_status, TranscriptStatus::Processing);
    }

    #[test]
    fn test_apply_episode_details_keeps_missing_fields() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let show_id = store.upsert_show(&NewShow::new("s", "Show")).unwrap();
        let id = store.upsert_episode(&NewEpisode::new("e", show_id, "Ep", 100)).unwrap();

        let details = EpisodeDetails {
            duration: Some(3600),
            audio_url: Some("https://cdn.example/ep.mp3".to_string()),
            ..Default::default()
        };
        store.apply_episode_details(id, &details).unwrap();

        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(episode.title, "Ep");
        assert_eq!(episode.duration, 3600);
        assert_eq!(episode.audio_url.as_deref(), Some("https://cdn.example/ep.mp3"));
    }

    #[tokio::test]
    async fn test_reset_episode() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let show_id = store.upsert_show(&NewShow::new("s", "Show")).unwrap();
        let id = store.upsert_episode(&NewEpisode::new("e", show_id, "Ep", 100)).unwrap();
        store.claim_episode(id).unwrap();
        store
            .insert_segment(&NewSegment {
                episode_id: id,
                start_time: 0,
                end_time: 100,
                text: "all of it".to_string(),
                vector: None,
            })
            .await
            .unwrap();
        store.complete_episode(id).unwrap();

        assert_eq!(store.reset_episode(id).unwrap(), 1);
        let episode = store.get_episode(id).unwrap().unwrap();
        assert_eq!(episode.transcript_status, TranscriptStatus::Pending);
        assert_eq!(store.segment_count().await.unwrap(), 0);
    }

    #[test]
    fn test_episode_context() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let show_id = store.upsert_show(&NewShow::new("s", "Show")).unwrap();
        let id = store.upsert_episode(&NewEpisode::new("e", show_id, "Ep", 100)).unwrap();

        let (episode, show) = store.episode_context(id).unwrap().unwrap();
        assert_eq!(episode.external_id, "e");
        assert_eq!(show.external_id, "s");
        assert!(store.episode_context(999).unwrap().is_none());
    }

    #[test]
    fn test_token_lifecycle() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let token = store.create_token("ci").unwrap();
        assert_eq!(token.token.len(), 64);
        assert!(token.is_active);

        let used = store.authenticate_token(&token.token).unwrap().unwrap();
        assert_eq!(used.requests_count, 1);
        assert!(used.last_used.is_some());

        assert!(store.authenticate_token("not-a-token").unwrap().is_none());

        assert_eq!(store.revoke_token("ci").unwrap(), 1);
        assert!(store.authenticate_token(&token.token).unwrap().is_none());
        assert!(!store.list_tokens().unwrap()[0].is_active);
    }
}
