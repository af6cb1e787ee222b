//! Podcast catalog access.
//!
//! The orchestrator only needs two things from a catalog: an episode's
//! transcript and its current metadata. [`ListenNotesClient`] provides both
//! over the Listen Notes HTTP API.

mod listennotes;

pub use listennotes::ListenNotesClient;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Podcast-level fields returned with an episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodcastDetails {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub website: Option<String>,
    pub rss: Option<String>,
}

/// Episode metadata as reported by the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeDetails {
    pub title: Option<String>,
    pub description: Option<String>,
    pub audio_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Duration in seconds.
    pub duration: Option<u32>,
    pub podcast: Option<PodcastDetails>,
}

/// Source of episode transcripts and metadata.
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetch an episode's transcript. `None` when the catalog has none.
    async fn get_transcript(&self, external_id: &str) -> Result<Option<String>>;

    /// Fetch an episode's metadata. `None` when the catalog does not know it.
    async fn get_episode_details(&self, external_id: &str) -> Result<Option<EpisodeDetails>>;
}
