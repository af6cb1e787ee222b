//! Brute-force similarity search over stored segment vectors.
//!
//! Every query scans the whole store and scores each vector by cosine
//! similarity: O(n·D) per query with no index. That is fine for a few
//! hundred thousand segments; past that an ANN index would be needed.

use crate::error::{PodsearchError, Result};
use crate::vector::Vector;
use crate::vector_store::{Segment, VectorStore};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Minimum score when the caller gives none.
pub const DEFAULT_THRESHOLD: f32 = 0.7;

/// Result count when the caller gives none.
pub const DEFAULT_LIMIT: usize = 5;

/// A scored search hit.
#[derive(Debug, Clone)]
pub struct SimilarityResult {
    /// The matched segment.
    pub segment: Segment,
    /// Cosine similarity to the query.
    pub score: f32,
}

/// Similarity search engine.
pub struct SearchEngine {
    vector_store: Arc<dyn VectorStore>,
    default_threshold: f32,
    default_limit: usize,
    dimensions: Option<usize>,
}

impl SearchEngine {
    /// Create a new search engine.
    pub fn new(vector_store: Arc<dyn VectorStore>) -> Self {
        Self {
            vector_store,
            default_threshold: DEFAULT_THRESHOLD,
            default_limit: DEFAULT_LIMIT,
            dimensions: None,
        }
    }

    /// Require queries to have the embedding model's dimension.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Set the threshold and limit used by [`search_default`](Self::search_default).
    pub fn with_defaults(mut self, threshold: f32, limit: usize) -> Self {
        self.default_threshold = threshold;
        self.default_limit = limit;
        self
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Search with the configured defaults.
    pub async fn search_default(&self, query: &Vector) -> Result<Vec<SimilarityResult>> {
        self.search(query, self.default_threshold, self.default_limit).await
    }

    /// Find up to `limit` segments scoring at least `threshold`, best first.
    ///
    /// Segments without a vector are skipped. Equal scores keep scan order.
    /// A query whose dimension differs from the configured model dimension is
    /// rejected as invalid input. Stored vectors of another size (left over
    /// from a previous model) are skipped and reported once per search.
    #[instrument(skip(self, query), fields(dim = query.dim()))]
    pub async fn search(&self, query: &Vector, threshold: f32, limit: usize) -> Result<Vec<SimilarityResult>> {
        if query.is_empty() {
            return Err(PodsearchError::InvalidInput("query vector is empty".to_string()));
        }
        if !query.is_finite() {
            return Err(PodsearchError::InvalidInput(
                "query vector contains non-finite values".to_string(),
            ));
        }
        if let Some(expected) = self.dimensions {
            if query.dim() != expected {
                return Err(PodsearchError::InvalidInput(format!(
                    "query has {} dimensions, expected {}",
                    query.dim(),
                    expected
                )));
            }
        }
        if threshold.is_nan() {
            return Err(PodsearchError::InvalidInput("threshold is not a number".to_string()));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut results: Vec<SimilarityResult> = Vec::new();
        let mut mismatched = 0usize;
        let scanned = self
            .vector_store
            .scan_all(&mut |segment: Segment| {
                let Some(vector) = segment.vector.as_ref() else {
                    return Ok(());
                };
                if vector.dim() != query.dim() {
                    mismatched += 1;
                    return Ok(());
                }

                let score = query.cosine_similarity(vector);
                if score >= threshold {
                    results.push(SimilarityResult { segment, score });
                }
                Ok(())
            })
            .await?;

        if mismatched > 0 {
            warn!(
                "Skipped {} segments whose vectors are not {}-dimensional; re-embed them with `reprocess`",
                mismatched,
                query.dim()
            );
        }

        // Stable sort: ties stay in scan order.
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        debug!("Scanned {} segments, {} matches", scanned, results.len());
        Ok(results)
    }
}
