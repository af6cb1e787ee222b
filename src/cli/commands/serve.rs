//! HTTP API server for integration with other systems.
//!
//! Every `/api` route requires an active token in the `X-API-Token` header.
//! Shows and episodes are addressed by their catalog ids.

use crate::cli::Output;
use crate::config::{SearchSettings, Settings};
use crate::error::PodsearchError;
use crate::search::SearchEngine;
use crate::vector::Vector;
use crate::vector_store::{SqliteVectorStore, VectorStore};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, warn};

const TOKEN_HEADER: &str = "X-API-Token";

/// Shared application state.
pub struct AppState {
    store: Arc<SqliteVectorStore>,
    search: SearchEngine,
    max_limit: usize,
}

impl AppState {
    /// `dimensions` is the embedding model's output size; queries of any
    /// other size are rejected.
    pub fn new(store: Arc<SqliteVectorStore>, settings: &SearchSettings, dimensions: usize) -> Self {
        let search = SearchEngine::new(store.clone() as Arc<dyn VectorStore>)
            .with_defaults(settings.default_threshold, settings.default_limit)
            .with_dimensions(dimensions);
        Self {
            store,
            search,
            max_limit: settings.max_limit.max(1),
        }
    }
}

/// Build the API router.
pub fn router(state: Arc<AppState>, cors_origins: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/search", post(search))
        .route("/api/shows", get(list_shows))
        .route("/api/shows/{id}/episodes", get(show_episodes))
        .route("/api/episodes/{id}/segments", get(episode_segments))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.trim() == "*" {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Run the HTTP API server.
pub async fn run_serve(host: Option<String>, port: Option<u16>, settings: Settings) -> anyhow::Result<()> {
    let store = Arc::new(SqliteVectorStore::new(&settings.sqlite_path())?);
    let state = Arc::new(AppState::new(
        store.clone(),
        &settings.search,
        settings.embedding.dimensions as usize,
    ));
    let app = router(state, &settings.server.cors_origins);

    let host = host.unwrap_or_else(|| settings.server.host.clone());
    let port = port.unwrap_or(settings.server.port);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    Output::header("podsearch API Server");
    println!();
    Output::success(&format!("Listening on http://{}", addr));
    Output::kv("Segments", &store.segment_count().await?.to_string());
    println!();
    println!("Endpoints:");
    Output::kv("Health", "GET  /health");
    Output::kv("Search", "POST /api/search");
    Output::kv("Shows", "GET  /api/shows");
    Output::kv("Episodes", "GET  /api/shows/{id}/episodes");
    Output::kv("Segments", "GET  /api/episodes/{id}/segments");
    println!();
    if store.list_tokens()?.iter().all(|t| !t.is_active) {
        Output::warning("No active API tokens. Create one with 'podsearch token create <name>'.");
    }
    Output::info("Press Ctrl+C to stop the server.");

    axum::serve(listener, app).await?;

    Ok(())
}

// === Request/Response Types ===

#[derive(Deserialize)]
struct SearchRequest {
    embedding: Option<Vec<f32>>,
    threshold: Option<f32>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Serialize)]
struct SearchHit {
    similarity: f32,
    segment: SegmentSummary,
    episode: Option<EpisodeRef>,
    show: Option<ShowRef>,
}

#[derive(Serialize)]
struct SegmentSummary {
    text: String,
    start_time: u32,
    end_time: u32,
}

#[derive(Serialize)]
struct EpisodeRef {
    id: String,
    title: String,
    audio_url: Option<String>,
    published_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ShowRef {
    id: String,
    title: String,
}

#[derive(Serialize)]
struct ShowsResponse {
    shows: Vec<ShowInfo>,
}

#[derive(Serialize)]
struct ShowInfo {
    id: String,
    title: String,
    description: Option<String>,
    publisher: Option<String>,
    website: Option<String>,
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct EpisodesResponse {
    episodes: Vec<EpisodeInfo>,
}

#[derive(Serialize)]
struct EpisodeInfo {
    id: String,
    title: String,
    description: Option<String>,
    audio_url: Option<String>,
    published_at: Option<DateTime<Utc>>,
    duration: u32,
    transcript_status: String,
}

#[derive(Serialize)]
struct SegmentsResponse {
    segments: Vec<SegmentInfo>,
}

#[derive(Serialize)]
struct SegmentInfo {
    id: i64,
    start_time: u32,
    end_time: u32,
    text: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error returned by handlers; internal details never reach the client.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<PodsearchError> for ApiError {
    fn from(e: PodsearchError) -> Self {
        match e {
            PodsearchError::InvalidInput(msg) => ApiError::new(StatusCode::BAD_REQUEST, msg),
            PodsearchError::Unauthorized(msg) => ApiError::new(StatusCode::UNAUTHORIZED, msg),
            PodsearchError::NotFound(msg) => ApiError::new(StatusCode::NOT_FOUND, format!("{} not found", msg)),
            other => {
                error!("Request failed: {}", other);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PodsearchError::Unauthorized("API token is required".to_string()))?;

    match state.store.authenticate_token(token)? {
        Some(_) => Ok(()),
        None => Err(PodsearchError::Unauthorized("Invalid or inactive API token".to_string()).into()),
    }
}

// === Handlers ===

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> ApiResult<SearchResponse> {
    authenticate(&state, &headers)?;

    let Json(req) = body.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    let embedding = req
        .embedding
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "embedding is required"))?;

    let threshold = req.threshold.unwrap_or(state.search.default_threshold());
    let limit = req
        .limit
        .unwrap_or(state.search.default_limit())
        .min(state.max_limit);

    let hits = state.search.search(&Vector::new(embedding), threshold, limit).await?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let context = state.store.episode_context(hit.segment.episode_id)?;
        let (episode, show) = match context {
            Some((episode, show)) => (
                Some(EpisodeRef {
                    id: episode.external_id,
                    title: episode.title,
                    audio_url: episode.audio_url,
                    published_at: episode.published_at,
                }),
                Some(ShowRef {
                    id: show.external_id,
                    title: show.title,
                }),
            ),
            None => (None, None),
        };

        results.push(SearchHit {
            similarity: hit.score,
            segment: SegmentSummary {
                text: hit.segment.text,
                start_time: hit.segment.start_time,
                end_time: hit.segment.end_time,
            },
            episode,
            show,
        });
    }

    Ok(Json(SearchResponse { results }))
}

async fn list_shows(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<ShowsResponse> {
    authenticate(&state, &headers)?;

    let shows = state
        .store
        .list_shows()?
        .into_iter()
        .map(|s| ShowInfo {
            id: s.external_id,
            title: s.title,
            description: s.description,
            publisher: s.publisher,
            website: s.website,
            last_updated: s.last_updated,
        })
        .collect();

    Ok(Json(ShowsResponse { shows }))
}

async fn show_episodes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<EpisodesResponse> {
    authenticate(&state, &headers)?;

    let show = state
        .store
        .get_show_by_external_id(&id)?
        .ok_or_else(|| PodsearchError::NotFound(format!("Show {}", id)))?;

    let episodes = state
        .store
        .list_episodes(show.id)?
        .into_iter()
        .map(|e| EpisodeInfo {
            id: e.external_id,
            title: e.title,
            description: e.description,
            audio_url: e.audio_url,
            published_at: e.published_at,
            duration: e.duration,
            transcript_status: e.transcript_status.to_string(),
        })
        .collect();

    Ok(Json(EpisodesResponse { episodes }))
}

async fn episode_segments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<SegmentsResponse> {
    authenticate(&state, &headers)?;

    let episode = state
        .store
        .get_episode_by_external_id(&id)?
        .ok_or_else(|| PodsearchError::NotFound(format!("Episode {}", id)))?;

    let segments = state
        .store
        .segments_for_episode(episode.id)
        .await?
        .into_iter()
        .map(|s| SegmentInfo {
            id: s.id,
            start_time: s.start_time,
            end_time: s.end_time,
            text: s.text,
        })
        .collect();

    Ok(Json(SegmentsResponse { segments }))
}
