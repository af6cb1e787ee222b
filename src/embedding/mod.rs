//! Embedding generation for transcript segments and search queries.
//!
//! [`Embedder`] is the backend seam (remote API or local model).
//! [`EmbeddingModel`] is the process-wide resource built once by the
//! composition root and shared by handle; it owns the input budget, the
//! inference timeout and the per-text failure policy.

#[cfg(feature = "onnx")]
mod onnx;
mod openai;

#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;
pub use openai::OpenAIEmbedder;

use crate::config::EmbeddingSettings;
use crate::vector::Vector;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

/// Default input budget in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 2048;

/// Default bound on a single inference call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of texts sent to the backend at once.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Why an embedding could not be produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("failed to load embedding model: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("input text is empty")]
    EmptyInput,

    #[error("expected {expected} dimensions, model returned {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vector, EmbeddingError>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>, EmbeddingError>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Identifier of the underlying model.
    fn model_id(&self) -> &str;
}

/// Shared embedding resource.
pub struct EmbeddingModel {
    backend: Arc<dyn Embedder>,
    max_input_chars: usize,
    timeout: Duration,
    batch_size: usize,
}

impl EmbeddingModel {
    /// Wrap a backend with default limits.
    pub fn new(backend: Arc<dyn Embedder>) -> Self {
        Self {
            backend,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            timeout: DEFAULT_TIMEOUT,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Build the configured backend.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self, EmbeddingError> {
        let backend: Arc<dyn Embedder> = match settings.provider.as_str() {
            "openai" => Arc::new(OpenAIEmbedder::with_config(
                &settings.model,
                settings.dimensions as usize,
                Duration::from_secs(settings.timeout_seconds),
            )?),
            #[cfg(feature = "onnx")]
            "onnx" => {
                let model_path = settings.model_path.as_deref().ok_or_else(|| {
                    EmbeddingError::ModelLoad("embedding.model_path is not set".to_string())
                })?;
                let tokenizer_path = settings.tokenizer_path.as_deref().ok_or_else(|| {
                    EmbeddingError::ModelLoad("embedding.tokenizer_path is not set".to_string())
                })?;
                Arc::new(OnnxEmbedder::new(
                    &settings.model,
                    crate::config::Settings::expand_path(model_path),
                    crate::config::Settings::expand_path(tokenizer_path),
                    settings.dimensions as usize,
                ))
            }
            #[cfg(not(feature = "onnx"))]
            "onnx" => {
                return Err(EmbeddingError::ModelLoad(
                    "onnx provider requires building with --features onnx".to_string(),
                ))
            }
            other => {
                return Err(EmbeddingError::ModelLoad(format!(
                    "unsupported embedding provider: {}",
                    other
                )))
            }
        };

        Ok(Self::new(backend)
            .with_max_input_chars(settings.max_input_chars)
            .with_timeout(Duration::from_secs(settings.timeout_seconds))
            .with_batch_size(settings.batch_size))
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn dimensions(&self) -> usize {
        self.backend.dimensions()
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Embed one text. Input beyond the budget is dropped, not rejected.
    #[instrument(skip(self, text), fields(model = %self.backend.model_id()))]
    pub async fn embed(&self, text: &str) -> Result<Vector, EmbeddingError> {
        self.embed_until(text, Instant::now() + self.timeout).await
    }

    /// Embed one text, giving up at `deadline`. Nothing reaches the backend
    /// once the deadline has passed.
    async fn embed_until(&self, text: &str, deadline: Instant) -> Result<Vector, EmbeddingError> {
        let input = self.prepare(text)?;

        let result = if Instant::now() >= deadline {
            Err(EmbeddingError::Timeout(self.timeout))
        } else {
            match tokio::time::timeout_at(deadline, self.backend.embed(input)).await {
                Ok(result) => result,
                Err(_) => Err(EmbeddingError::Timeout(self.timeout)),
            }
        };

        let result = result.and_then(|v| self.check(v));
        if let Err(e) = &result {
            warn!("Embedding failed: {}", e);
        }
        result
    }

    /// Embed many texts; one result per input, in order.
    ///
    /// A failed backend batch falls back to embedding its texts one by one so
    /// a single bad input cannot sink its neighbours. The fallback shares one
    /// `timeout` budget per batch. A batch that timed out is not retried: its
    /// texts all fail with [`EmbeddingError::Timeout`], so a batch never takes
    /// more than twice the timeout.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vector, EmbeddingError>> {
        let mut results = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(self.batch_size) {
            let prepared: Result<Vec<String>, EmbeddingError> = chunk
                .iter()
                .map(|t| self.prepare(t).map(str::to_string))
                .collect();

            let batch = match prepared {
                Ok(inputs) => {
                    match tokio::time::timeout(self.timeout, self.backend.embed_batch(&inputs)).await {
                        Ok(Ok(vectors)) if vectors.len() == inputs.len() => BatchOutcome::Done(vectors),
                        Ok(Ok(vectors)) => {
                            warn!(
                                "Backend returned {} embeddings for {} inputs",
                                vectors.len(),
                                inputs.len()
                            );
                            BatchOutcome::Retry
                        }
                        Ok(Err(e)) => {
                            warn!("Batch embedding failed, retrying individually: {}", e);
                            BatchOutcome::Retry
                        }
                        Err(_) => {
                            warn!("Batch of {} timed out after {:?}", inputs.len(), self.timeout);
                            BatchOutcome::TimedOut
                        }
                    }
                }
                Err(_) => BatchOutcome::Retry,
            };

            match batch {
                BatchOutcome::Done(vectors) => results.extend(vectors.into_iter().map(|v| self.check(v))),
                BatchOutcome::Retry => {
                    let deadline = Instant::now() + self.timeout;
                    for text in chunk {
                        results.push(self.embed_until(text, deadline).await);
                    }
                }
                BatchOutcome::TimedOut => {
                    results.extend(chunk.iter().map(|_| Err(EmbeddingError::Timeout(self.timeout))));
                }
            }
        }

        debug!("Embedded {} texts", results.len());
        results
    }

    fn prepare<'a>(&self, text: &'a str) -> Result<&'a str, EmbeddingError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        Ok(truncate_chars(text, self.max_input_chars))
    }

    fn check(&self, vector: Vector) -> Result<Vector, EmbeddingError> {
        let expected = self.backend.dimensions();
        if vector.dim() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: vector.dim(),
            });
        }
        if !vector.is_finite() {
            return Err(EmbeddingError::Inference(
                "model produced non-finite values".to_string(),
            ));
        }
        Ok(vector)
    }
}

enum BatchOutcome {
    Done(Vec<Vector>),
    Retry,
    TimedOut,
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
