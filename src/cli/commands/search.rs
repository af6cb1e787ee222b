//! Search command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::embedding::EmbeddingModel;
use crate::search::SearchEngine;
use crate::vector_store::{SqliteVectorStore, VectorStore};
use anyhow::Result;
use std::sync::Arc;

/// Run the search command.
pub async fn run_search(
    query: &str,
    limit: Option<usize>,
    threshold: Option<f32>,
    settings: Settings,
) -> Result<()> {
    let store = Arc::new(SqliteVectorStore::new(&settings.sqlite_path())?);
    let embedder = EmbeddingModel::from_settings(&settings.embedding)?;
    let engine = SearchEngine::new(store.clone() as Arc<dyn VectorStore>).with_dimensions(embedder.dimensions());

    let limit = limit
        .unwrap_or(settings.search.default_limit)
        .min(settings.search.max_limit);
    let threshold = threshold.unwrap_or(settings.search.default_threshold);

    let spinner = Output::spinner("Searching...");
    let results = match embedder.embed(query).await {
        Ok(vector) => engine.search(&vector, threshold, limit).await,
        Err(e) => Err(e.into()),
    };
    spinner.finish_and_clear();

    let results = match results {
        Ok(results) => results,
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    };

    if results.is_empty() {
        Output::warning("No results found matching your query.");
        return Ok(());
    }

    Output::success(&format!("Found {} results", results.len()));
    for result in &results {
        let (show, episode) = match store.episode_context(result.segment.episode_id)? {
            Some((episode, show)) => (show.title, episode.title),
            None => ("?".to_string(), format!("episode {}", result.segment.episode_id)),
        };
        Output::search_result(
            &show,
            &episode,
            &result.segment.format_timestamp(),
            result.score,
            &result.segment.text,
        );
    }

    Ok(())
}
