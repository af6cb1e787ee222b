//! Listen Notes API client.

use super::{EpisodeDetails, PodcastDetails, TranscriptSource};
use crate::config::CatalogSettings;
use crate::error::{PodsearchError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const API_KEY_HEADER: &str = "X-ListenAPI-Key";

/// Authenticated Listen Notes client.
pub struct ListenNotesClient {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    transcript: Option<String>,
}

#[derive(Deserialize)]
struct EpisodeResponse {
    title: Option<String>,
    description: Option<String>,
    audio: Option<String>,
    pub_date_ms: Option<i64>,
    audio_length_sec: Option<u32>,
    podcast: Option<PodcastResponse>,
}

#[derive(Deserialize)]
struct PodcastResponse {
    id: String,
    title: Option<String>,
    description: Option<String>,
    publisher: Option<String>,
    website: Option<String>,
    rss: Option<String>,
}

impl From<EpisodeResponse> for EpisodeDetails {
    fn from(r: EpisodeResponse) -> Self {
        Self {
            title: r.title,
            description: r.description,
            audio_url: r.audio,
            published_at: r.pub_date_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
            duration: r.audio_length_sec,
            podcast: r.podcast.map(|p| PodcastDetails {
                id: p.id,
                title: p.title,
                description: p.description,
                publisher: p.publisher,
                website: p.website,
                rss: p.rss,
            }),
        }
    }
}

impl ListenNotesClient {
    /// Create a client for `base_url`.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        // A trailing slash makes `Url::join` append instead of replace.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| PodsearchError::Config(format!("Invalid catalog base URL '{}': {}", base_url, e)))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    /// Create a client from settings. Fails when no API key is configured.
    pub fn from_settings(settings: &CatalogSettings) -> Result<Self> {
        let api_key = settings.resolved_api_key().ok_or_else(|| {
            PodsearchError::Config(
                "No Listen Notes API key. Set LISTENNOTES_API_KEY or catalog.api_key".to_string(),
            )
        })?;
        Self::new(&settings.base_url, &api_key, Duration::from_secs(settings.timeout_seconds))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| PodsearchError::Catalog(format!("Invalid request path '{}': {}", path, e)))?;

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Catalog request {} returned {}", path, status);
            return Ok(None);
        }

        Ok(Some(response.json::<T>().await?))
    }
}

#[async_trait]
impl TranscriptSource for ListenNotesClient {
    #[instrument(skip(self))]
    async fn get_transcript(&self, external_id: &str) -> Result<Option<String>> {
        let response: Option<TranscriptResponse> =
            self.get_json(&format!("episodes/{}/transcript", external_id)).await?;

        let transcript = response.and_then(|r| r.transcript);
        debug!(
            "Transcript for {}: {}",
            external_id,
            transcript.as_ref().map(|t| t.len()).unwrap_or(0)
        );
        Ok(transcript)
    }

    #[instrument(skip(self))]
    async fn get_episode_details(&self, external_id: &str) -> Result<Option<EpisodeDetails>> {
        let response: Option<EpisodeResponse> = self.get_json(&format!("episodes/{}", external_id)).await?;
        Ok(response.map(EpisodeDetails::from))
    }
}
