//! Vector store abstraction for podsearch.
//!
//! Segments and their vectors live in one record; a segment without a vector
//! (embedding failed or not yet computed) is stored with an absent vector and
//! is invisible to search.

mod library;
mod memory;
mod sqlite;

pub use library::{NewEpisode, NewShow};
pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

use crate::chunking::format_timestamp;
use crate::error::Result;
use crate::vector::Vector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row id of a persisted segment.
pub type SegmentId = i64;

/// A segment ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewSegment {
    pub episode_id: i64,
    pub start_time: u32,
    pub end_time: u32,
    pub text: String,
    pub vector: Option<Vector>,
}

/// A time-bounded slice of an episode transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    /// Owning episode.
    pub episode_id: i64,
    /// Start time in seconds.
    pub start_time: u32,
    /// End time in seconds.
    pub end_time: u32,
    /// Text content.
    pub text: String,
    /// Embedding vector, absent until embedding succeeds.
    pub vector: Option<Vector>,
    pub created_at: DateTime<Utc>,
}

impl Segment {
    /// Format the start time for display.
    pub fn format_timestamp(&self) -> String {
        format_timestamp(self.start_time)
    }
}

/// Transcript processing state of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscriptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptStatus::Pending => "pending",
            TranscriptStatus::Processing => "processing",
            TranscriptStatus::Completed => "completed",
            TranscriptStatus::Failed => "failed",
        }
    }

    /// Completed and failed runs do not move on their own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscriptStatus::Completed | TranscriptStatus::Failed)
    }
}

impl std::str::FromStr for TranscriptStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TranscriptStatus::Pending),
            "processing" => Ok(TranscriptStatus::Processing),
            "completed" => Ok(TranscriptStatus::Completed),
            "failed" => Ok(TranscriptStatus::Failed),
            _ => Err(format!("Unknown transcript status: {}", s)),
        }
    }
}

impl std::fmt::Display for TranscriptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked podcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Show {
    pub id: i64,
    /// Catalog identifier.
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub website: Option<String>,
    pub rss_feed: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// A podcast episode and its transcript status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: i64,
    /// Catalog identifier.
    pub external_id: String,
    pub show_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub audio_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Duration in seconds.
    pub duration: u32,
    pub transcript_status: TranscriptStatus,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Bearer credential for the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: i64,
    pub token: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub requests_count: i64,
}

/// Receives each scanned segment; returning an error stops the scan.
pub type SegmentVisitor<'a> = dyn FnMut(Segment) -> Result<()> + Send + 'a;

/// Trait for vector store implementations.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persist a segment, with or without a vector.
    async fn insert_segment(&self, segment: &NewSegment) -> Result<SegmentId>;

    /// Attach a vector to a segment that has none. Vectors are write-once.
    async fn store(&self, segment_id: SegmentId, vector: &Vector) -> Result<()>;

    /// Load a segment's vector, `None` if absent.
    async fn load(&self, segment_id: SegmentId) -> Result<Option<Vector>>;

    /// Visit every stored segment in insertion order without materialising
    /// the whole table.
    async fn scan_all(&self, visitor: &mut SegmentVisitor<'_>) -> Result<usize>;

    /// All segments of an episode, in order.
    async fn segments_for_episode(&self, episode_id: i64) -> Result<Vec<Segment>>;

    /// Delete an episode's segments.
    async fn delete_by_episode(&self, episode_id: i64) -> Result<usize>;

    /// Get total segment count.
    async fn segment_count(&self) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TranscriptStatus::Pending,
            TranscriptStatus::Processing,
            TranscriptStatus::Completed,
            TranscriptStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TranscriptStatus>().unwrap(), status);
        }
        assert!("done".parse::<TranscriptStatus>().is_err());
        assert!(TranscriptStatus::Failed.is_terminal());
        assert!(!TranscriptStatus::Processing.is_terminal());
    }
}
