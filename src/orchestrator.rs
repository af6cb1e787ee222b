//! Pipeline orchestrator for podsearch.
//!
//! Coordinates transcript fetch, segmentation, embedding and persistence for
//! one episode at a time, and drives the per-show update cycle.

use crate::catalog::{ListenNotesClient, TranscriptSource};
use crate::chunking::{chunk_transcript, ChunkingConfig};
use crate::config::Settings;
use crate::embedding::EmbeddingModel;
use crate::error::{PodsearchError, Result};
use crate::vector_store::{
    NewEpisode, NewSegment, NewShow, SqliteVectorStore, TranscriptStatus, VectorStore,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Why an episode run did not complete.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Episode {0} not found")]
    EpisodeNotFound(i64),

    #[error("Episode is {0}, not pending or failed")]
    NotPending(TranscriptStatus),

    #[error("No transcript available")]
    NoTranscript,

    #[error(transparent)]
    Store(#[from] PodsearchError),
}

/// What a completed episode run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeOutcome {
    pub segments_created: usize,
    /// Segments persisted without a vector because embedding failed.
    pub segments_without_vector: usize,
}

/// Totals of one show update cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub show_id: i64,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub segments_created: usize,
}

impl UpdateSummary {
    fn absorb(&mut self, other: &UpdateSummary) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.segments_created += other.segments_created;
    }
}

/// The main orchestrator for the podsearch pipeline.
pub struct Orchestrator {
    settings: Settings,
    store: Arc<SqliteVectorStore>,
    embedder: Arc<EmbeddingModel>,
    transcripts: Arc<dyn TranscriptSource>,
}

impl Orchestrator {
    /// Build every component from settings.
    pub fn new(settings: Settings) -> Result<Self> {
        let store = Arc::new(SqliteVectorStore::new(&settings.sqlite_path())?);
        let embedder = Arc::new(EmbeddingModel::from_settings(&settings.embedding)?);
        let transcripts = Arc::new(ListenNotesClient::from_settings(&settings.catalog)?);

        info!(
            "Orchestrator ready (model {}, {} dims)",
            embedder.model_id(),
            embedder.dimensions()
        );

        Ok(Self::with_components(settings, store, embedder, transcripts))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        store: Arc<SqliteVectorStore>,
        embedder: Arc<EmbeddingModel>,
        transcripts: Arc<dyn TranscriptSource>,
    ) -> Self {
        Self {
            settings,
            store,
            embedder,
            transcripts,
        }
    }

    pub fn store(&self) -> Arc<SqliteVectorStore> {
        self.store.clone()
    }

    pub fn embedder(&self) -> Arc<EmbeddingModel> {
        self.embedder.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start tracking a catalog episode (and its show). Returns the episode id.
    #[instrument(skip(self))]
    pub async fn track_episode(&self, external_id: &str) -> Result<i64> {
        let details = self
            .transcripts
            .get_episode_details(external_id)
            .await?
            .ok_or_else(|| PodsearchError::NotFound(format!("Catalog episode {}", external_id)))?;

        let podcast = details.podcast.clone().ok_or_else(|| {
            PodsearchError::Catalog(format!("Episode {} has no podcast information", external_id))
        })?;

        let show_id = self.store.upsert_show(&NewShow {
            external_id: podcast.id.clone(),
            title: podcast.title.clone().unwrap_or_else(|| podcast.id.clone()),
            description: podcast.description,
            publisher: podcast.publisher,
            website: podcast.website,
            rss_feed: podcast.rss,
        })?;

        let episode_id = self.store.upsert_episode(&NewEpisode {
            external_id: external_id.to_string(),
            show_id,
            title: details.title.clone().unwrap_or_else(|| external_id.to_string()),
            description: details.description.clone(),
            audio_url: details.audio_url.clone(),
            published_at: details.published_at,
            duration: details.duration.unwrap_or(0),
        })?;

        info!("Tracking episode {} (show {})", episode_id, show_id);
        Ok(episode_id)
    }

    /// Move an episode from `pending` or `failed` to `processing`, dropping
    /// segments of an earlier failed run. False for any other state.
    pub fn claim_episode(&self, episode_id: i64) -> Result<bool> {
        self.store.claim_episode(episode_id)
    }

    /// Put an episode back to `pending`, dropping its segments.
    pub fn reset_episode(&self, episode_id: i64) -> Result<usize> {
        self.store.reset_episode(episode_id)
    }

    /// Claim and process one episode.
    ///
    /// Only `pending` and `failed` episodes are run. A missing transcript
    /// or a persistence failure leaves the episode `failed`; segments already
    /// written stay. Per-segment embedding failures only drop that segment's
    /// vector.
    #[instrument(skip(self))]
    pub async fn process_episode(&self, episode_id: i64) -> std::result::Result<EpisodeOutcome, ProcessingError> {
        let episode = self
            .store
            .get_episode(episode_id)?
            .ok_or(ProcessingError::EpisodeNotFound(episode_id))?;

        if !self.claim_episode(episode_id)? {
            return Err(ProcessingError::NotPending(episode.transcript_status));
        }

        let transcript = match self.transcripts.get_transcript(&episode.external_id).await {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("No transcript for episode {}", episode_id);
                self.mark_failed(episode_id);
                return Err(ProcessingError::NoTranscript);
            }
            Err(e) => {
                warn!("Transcript fetch failed for episode {}: {}", episode_id, e);
                self.mark_failed(episode_id);
                return Err(ProcessingError::NoTranscript);
            }
        };

        let config = ChunkingConfig {
            max_length: self.settings.segmenting.max_segment_length,
        };
        let chunks = chunk_transcript(&transcript, episode.duration, &config);
        info!("Episode {}: {} segments", episode_id, chunks.len());

        let mut outcome = EpisodeOutcome::default();
        let batch_size = self.settings.embedding.batch_size.max(1);

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await;

            for (chunk, vector) in batch.iter().zip(vectors) {
                let vector = match vector {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!("Segment {} of episode {} has no vector: {}", chunk.order, episode_id, e);
                        outcome.segments_without_vector += 1;
                        None
                    }
                };

                let segment = NewSegment {
                    episode_id,
                    start_time: chunk.start_time,
                    end_time: chunk.end_time,
                    text: chunk.text.clone(),
                    vector,
                };

                if let Err(e) = self.store.insert_segment(&segment).await {
                    error!("Failed to persist segment {} of episode {}: {}", chunk.order, episode_id, e);
                    self.mark_failed(episode_id);
                    return Err(ProcessingError::Store(e));
                }
                outcome.segments_created += 1;
            }
        }

        if let Err(e) = self.store.complete_episode(episode_id) {
            self.mark_failed(episode_id);
            return Err(ProcessingError::Store(e));
        }

        info!(
            "Episode {} completed: {} segments, {} without vector",
            episode_id, outcome.segments_created, outcome.segments_without_vector
        );
        Ok(outcome)
    }

    /// Process every pending or previously failed episode of a show.
    ///
    /// Metadata is refreshed from the catalog first when available. Episode
    /// failures are counted, never propagated.
    #[instrument(skip(self))]
    pub async fn update_show_episodes(&self, show_id: i64) -> Result<UpdateSummary> {
        if self.store.get_show(show_id)?.is_none() {
            return Err(PodsearchError::NotFound(format!("Show {}", show_id)));
        }

        let mut summary = UpdateSummary {
            show_id,
            ..Default::default()
        };

        for episode in self.store.pending_episodes(show_id)? {
            match self.transcripts.get_episode_details(&episode.external_id).await {
                Ok(Some(details)) => {
                    if let Err(e) = self.store.apply_episode_details(episode.id, &details) {
                        warn!("Failed to refresh episode {}: {}", episode.id, e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to fetch details for episode {}: {}", episode.id, e),
            }

            match self.process_episode(episode.id).await {
                Ok(outcome) => {
                    summary.completed += 1;
                    summary.segments_created += outcome.segments_created;
                }
                Err(ProcessingError::NotPending(status)) => {
                    info!("Skipping episode {} ({})", episode.id, status);
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("Episode {} failed: {}", episode.id, e);
                    summary.failed += 1;
                }
            }
        }

        self.store.touch_show(show_id)?;
        Ok(summary)
    }

    /// Run the update cycle for every tracked show.
    pub async fn update_all_shows(&self) -> Result<UpdateSummary> {
        let mut total = UpdateSummary::default();

        for show in self.store.list_shows()? {
            match self.update_show_episodes(show.id).await {
                Ok(summary) => total.absorb(&summary),
                Err(e) => error!("Update of show {} failed: {}", show.id, e),
            }
        }

        Ok(total)
    }

    fn mark_failed(&self, episode_id: i64) {
        if let Err(e) = self.store.set_episode_status(episode_id, TranscriptStatus::Failed) {
            error!("Failed to mark episode {} as failed: {}", episode_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{EpisodeDetails, PodcastDetails};
    use crate::embedding::{Embedder, EmbeddingError};
    use crate::vector::Vector;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Fails on any text containing "broken".
    struct FlakyEmbedder;

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, text: &str) -> std::result::Result<Vector, EmbeddingError> {
            if text.contains("broken") {
                return Err(EmbeddingError::Inference("bad segment".to_string()));
            }
            Ok(Vector::new(vec![text.len() as f32, 1.0]))
        }

        async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vector>, EmbeddingError> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "flaky"
        }
    }

    #[derive(Default)]
    struct FakeCatalog {
        transcripts: HashMap<String, String>,
        details: HashMap<String, EpisodeDetails>,
        unreachable: AtomicBool,
    }

    #[async_trait]
    impl TranscriptSource for FakeCatalog {
        async fn get_transcript(&self, external_id: &str) -> Result<Option<String>> {
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(PodsearchError::Catalog("connection refused".to_string()));
            }
            Ok(self.transcripts.get(external_id).cloned())
        }

        async fn get_episode_details(&self, external_id: &str) -> Result<Option<EpisodeDetails>> {
            Ok(self.details.get(external_id).cloned())
        }
    }

    fn orchestrator(catalog: FakeCatalog) -> Orchestrator {
        orchestrator_sharing(Arc::new(catalog))
    }

    fn orchestrator_sharing(catalog: Arc<FakeCatalog>) -> Orchestrator {
        let mut settings = Settings::default();
        settings.segmenting.max_segment_length = 10;

        Orchestrator::with_components(
            settings,
            Arc::new(SqliteVectorStore::in_memory().unwrap()),
            Arc::new(EmbeddingModel::new(Arc::new(FlakyEmbedder))),
            catalog,
        )
    }

    fn seed_episode(orch: &Orchestrator, external_id: &str, duration: u32) -> (i64, i64) {
        let store = orch.store();
        let show_id = store.upsert_show(&NewShow::new("show", "Show")).unwrap();
        let episode_id = store
            .upsert_episode(&NewEpisode::new(external_id, show_id, "Episode", duration))
            .unwrap();
        (show_id, episode_id)
    }

    fn catalog_with(external_id: &str, transcript: &str) -> FakeCatalog {
        let mut catalog = FakeCatalog::default();
        catalog
            .transcripts
            .insert(external_id.to_string(), transcript.to_string());
        catalog
    }

    #[tokio::test]
    async fn test_failed_embedding_keeps_segment_without_vector() {
        let orch = orchestrator(catalog_with("ep", "alpha bravo broken delta echo"));
        let (_, episode_id) = seed_episode(&orch, "ep", 100);

        let outcome = orch.process_episode(episode_id).await.unwrap();
        assert_eq!(outcome.segments_created, 5);
        assert_eq!(outcome.segments_without_vector, 1);

        let store = orch.store();
        let episode = store.get_episode(episode_id).unwrap().unwrap();
        assert_eq!(episode.transcript_status, TranscriptStatus::Completed);
        assert!(episode.last_updated.is_some());

        let segments = store.segments_for_episode(episode_id).await.unwrap();
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[2].text, "broken");
        assert!(segments[2].vector.is_none());
        assert!(segments.iter().enumerate().all(|(i, s)| i == 2 || s.vector.is_some()));

        let ranges: Vec<(u32, u32)> = segments.iter().map(|s| (s.start_time, s.end_time)).collect();
        assert_eq!(ranges, vec![(0, 20), (20, 40), (40, 60), (60, 80), (80, 100)]);
    }

    #[tokio::test]
    async fn test_missing_transcript_fails_episode() {
        let orch = orchestrator(FakeCatalog::default());
        let (_, episode_id) = seed_episode(&orch, "ep", 100);

        let result = orch.process_episode(episode_id).await;
        assert!(matches!(result, Err(ProcessingError::NoTranscript)));

        let store = orch.store();
        let episode = store.get_episode(episode_id).unwrap().unwrap();
        assert_eq!(episode.transcript_status, TranscriptStatus::Failed);
        assert_eq!(store.segment_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_fails_episode() {
        let orch = orchestrator(FakeCatalog {
            unreachable: AtomicBool::new(true),
            ..Default::default()
        });
        let (_, episode_id) = seed_episode(&orch, "ep", 100);

        assert!(matches!(
            orch.process_episode(episode_id).await,
            Err(ProcessingError::NoTranscript)
        ));
        let episode = orch.store().get_episode(episode_id).unwrap().unwrap();
        assert_eq!(episode.transcript_status, TranscriptStatus::Failed);
    }

    #[tokio::test]
    async fn test_failed_episode_is_retried_next_cycle() {
        let catalog = Arc::new(catalog_with("ep", "alpha bravo"));
        catalog.unreachable.store(true, Ordering::SeqCst);
        let orch = orchestrator_sharing(catalog.clone());
        let (show_id, episode_id) = seed_episode(&orch, "ep", 60);

        let first = orch.update_show_episodes(show_id).await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(first.completed, 0);
        let episode = orch.store().get_episode(episode_id).unwrap().unwrap();
        assert_eq!(episode.transcript_status, TranscriptStatus::Failed);

        catalog.unreachable.store(false, Ordering::SeqCst);
        let second = orch.update_show_episodes(show_id).await.unwrap();
        assert_eq!(second.completed, 1);
        assert_eq!(second.failed, 0);
        assert_eq!(second.segments_created, 2);

        let store = orch.store();
        let episode = store.get_episode(episode_id).unwrap().unwrap();
        assert_eq!(episode.transcript_status, TranscriptStatus::Completed);
        assert_eq!(store.segments_for_episode(episode_id).await.unwrap().len(), 2);

        let third = orch.update_show_episodes(show_id).await.unwrap();
        assert_eq!(third, UpdateSummary { show_id, ..Default::default() });
        assert_eq!(store.segment_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retry_after_partial_run_does_not_duplicate_segments() {
        let orch = orchestrator(catalog_with("ep", "alpha bravo charlie"));
        let (_, episode_id) = seed_episode(&orch, "ep", 90);
        let store = orch.store();

        // A run that died after writing one segment.
        assert!(orch.claim_episode(episode_id).unwrap());
        store
            .insert_segment(&NewSegment {
                episode_id,
                start_time: 0,
                end_time: 30,
                text: "alpha".to_string(),
                vector: None,
            })
            .await
            .unwrap();
        store.set_episode_status(episode_id, TranscriptStatus::Failed).unwrap();

        let outcome = orch.process_episode(episode_id).await.unwrap();
        assert_eq!(outcome.segments_created, 3);
        assert_eq!(store.segments_for_episode(episode_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_completed_episode_is_skipped_until_reset() {
        let orch = orchestrator(catalog_with("ep", "alpha bravo"));
        let (_, episode_id) = seed_episode(&orch, "ep", 60);

        orch.process_episode(episode_id).await.unwrap();
        let again = orch.process_episode(episode_id).await;
        assert!(matches!(
            again,
            Err(ProcessingError::NotPending(TranscriptStatus::Completed))
        ));
        assert_eq!(orch.store().segment_count().await.unwrap(), 2);

        assert_eq!(orch.reset_episode(episode_id).unwrap(), 2);
        orch.process_episode(episode_id).await.unwrap();
        assert_eq!(orch.store().segment_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_episode() {
        let orch = orchestrator(FakeCatalog::default());
        assert!(matches!(
            orch.process_episode(42).await,
            Err(ProcessingError::EpisodeNotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_update_show_episodes() {
        let mut catalog = catalog_with("good", "alpha bravo charlie");
        catalog.details.insert(
            "good".to_string(),
            EpisodeDetails {
                title: Some("Refreshed".to_string()),
                duration: Some(90),
                ..Default::default()
            },
        );
        let orch = orchestrator(catalog);
        let store = orch.store();

        let show_id = store.upsert_show(&NewShow::new("show", "Show")).unwrap();
        let good = store.upsert_episode(&NewEpisode::new("good", show_id, "Good", 0)).unwrap();
        let missing = store
            .upsert_episode(&NewEpisode::new("missing", show_id, "Missing", 30))
            .unwrap();
        let done = store.upsert_episode(&NewEpisode::new("done", show_id, "Done", 30)).unwrap();
        store.complete_episode(done).unwrap();

        let summary = orch.update_show_episodes(show_id).await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.segments_created, 3);

        let good = store.get_episode(good).unwrap().unwrap();
        assert_eq!(good.title, "Refreshed");
        assert_eq!(good.duration, 90);
        assert_eq!(good.transcript_status, TranscriptStatus::Completed);

        let missing = store.get_episode(missing).unwrap().unwrap();
        assert_eq!(missing.transcript_status, TranscriptStatus::Failed);

        assert!(store.get_show(show_id).unwrap().unwrap().last_updated.is_some());

        let total = orch.update_all_shows().await.unwrap();
        assert_eq!(total.completed, 0);
        assert_eq!(total.segments_created, 0);
    }

    #[tokio::test]
    async fn test_track_episode() {
        let mut catalog = FakeCatalog::default();
        catalog.details.insert(
            "ep9".to_string(),
            EpisodeDetails {
                title: Some("Nine".to_string()),
                duration: Some(600),
                podcast: Some(PodcastDetails {
                    id: "pod".to_string(),
                    title: Some("Pod".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        let orch = orchestrator(catalog);

        let id = orch.track_episode("ep9").await.unwrap();
        let (episode, show) = orch.store().episode_context(id).unwrap().unwrap();
        assert_eq!(episode.title, "Nine");
        assert_eq!(episode.duration, 600);
        assert_eq!(episode.transcript_status, TranscriptStatus::Pending);
        assert_eq!(show.title, "Pod");

        assert!(orch.track_episode("unknown").await.is_err());
    }
}
