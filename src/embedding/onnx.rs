//! Local sentence-embedding model served through ONNX Runtime.
//!
//! The session is loaded on first use and then shared. `Session::run` needs
//! exclusive access, so inference is serialised behind a mutex and executed
//! on the blocking pool.

use super::{Embedder, EmbeddingError};
use crate::vector::Vector;
use async_trait::async_trait;
use ort::{inputs, session::Session, value::Value};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

/// Token budget of BERT-style encoders.
const MAX_TOKENS: usize = 512;

struct LoadedModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    dimensions: usize,
}

/// Lazily-initialised ONNX embedder with mean pooling.
pub struct OnnxEmbedder {
    model_id: String,
    model_path: PathBuf,
    tokenizer_path: PathBuf,
    dimensions: usize,
    loaded: OnceCell<Arc<LoadedModel>>,
}

impl OnnxEmbedder {
    pub fn new(model_id: &str, model_path: PathBuf, tokenizer_path: PathBuf, dimensions: usize) -> Self {
        Self {
            model_id: model_id.to_string(),
            model_path,
            tokenizer_path,
            dimensions,
            loaded: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<Arc<LoadedModel>, EmbeddingError> {
        let model = self
            .loaded
            .get_or_try_init(|| async {
                let model_path = self.model_path.clone();
                let tokenizer_path = self.tokenizer_path.clone();
                let dimensions = self.dimensions;

                tokio::task::spawn_blocking(move || LoadedModel::load(&model_path, &tokenizer_path, dimensions))
                    .await
                    .map_err(|e| EmbeddingError::ModelLoad(format!("Loader task failed: {}", e)))?
                    .map(Arc::new)
            })
            .await?;
        Ok(model.clone())
    }
}

impl LoadedModel {
    fn load(model_path: &PathBuf, tokenizer_path: &PathBuf, dimensions: usize) -> Result<Self, EmbeddingError> {
        ort::init()
            .commit()
            .map_err(|e| EmbeddingError::ModelLoad(format!("Failed to initialize ort: {}", e)))?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| EmbeddingError::ModelLoad(format!("Failed to load tokenizer: {}", e)))?;

        let model_bytes = std::fs::read(model_path)
            .map_err(|e| EmbeddingError::ModelLoad(format!("Failed to read model file: {}", e)))?;

        let session = Session::builder()
            .map_err(|e| EmbeddingError::ModelLoad(format!("Failed to create session builder: {}", e)))?
            .commit_from_memory(&model_bytes)
            .map_err(|e| EmbeddingError::ModelLoad(format!("Failed to load ONNX model: {}", e)))?;

        info!("Loaded embedding model from {:?}", model_path);

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            dimensions,
        })
    }

    fn infer(&self, text: &str) -> Result<Vector, EmbeddingError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbeddingError::Inference(format!("Tokenization failed: {}", e)))?;

        let len = encoding.get_ids().len().min(MAX_TOKENS);
        let attention_mask = &encoding.get_attention_mask()[..len];

        let input_ids: Vec<i64> = encoding.get_ids()[..len].iter().map(|&id| id as i64).collect();
        let mask: Vec<i64> = attention_mask.iter().map(|&m| m as i64).collect();
        let token_type_ids: Vec<i64> = vec![0; len];

        let input_ids = Value::from_array((vec![1, len], input_ids))
            .map_err(|e| EmbeddingError::Inference(format!("Failed to create input_ids tensor: {}", e)))?;
        let mask_value = Value::from_array((vec![1, len], mask))
            .map_err(|e| EmbeddingError::Inference(format!("Failed to create attention_mask tensor: {}", e)))?;
        let token_type_ids = Value::from_array((vec![1, len], token_type_ids))
            .map_err(|e| EmbeddingError::Inference(format!("Failed to create token_type_ids tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbeddingError::Inference(format!("Model lock poisoned: {}", e)))?;

        let outputs = session
            .run(inputs![
                "input_ids" => input_ids,
                "attention_mask" => mask_value,
                "token_type_ids" => token_type_ids
            ])
            .map_err(|e| EmbeddingError::Inference(format!("ONNX inference failed: {}", e)))?;

        let (shape, data) = outputs["last_hidden_state"]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::Inference(format!("Failed to extract output tensor: {}", e)))?;

        if shape.len() != 3 || shape[0] != 1 {
            return Err(EmbeddingError::Inference(format!("Unexpected output shape: {:?}", shape)));
        }

        let seq_len = shape[1] as usize;
        let hidden_dim = shape[2] as usize;
        if hidden_dim != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: hidden_dim,
            });
        }

        Ok(Vector::new(mean_pool(data, seq_len, hidden_dim, attention_mask)))
    }
}

/// Average the token vectors whose attention mask is set.
fn mean_pool(data: &[f32], seq_len: usize, hidden_dim: usize, attention_mask: &[u32]) -> Vec<f32> {
    let mut pooled = vec![0.0f32; hidden_dim];
    let mut mask_sum = 0.0f32;

    for (i, &mask) in attention_mask.iter().enumerate().take(seq_len) {
        if mask > 0 {
            let row = &data[i * hidden_dim..(i + 1) * hidden_dim];
            for (acc, value) in pooled.iter_mut().zip(row) {
                *acc += value;
            }
            mask_sum += 1.0;
        }
    }

    if mask_sum > 0.0 {
        for val in pooled.iter_mut() {
            *val /= mask_sum;
        }
    }

    pooled
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    #[instrument(skip(self, text))]
    async fn embed(&self, text: &str) -> Result<Vector, EmbeddingError> {
        let model = self.model().await?;
        let text = text.to_string();

        tokio::task::spawn_blocking(move || model.infer(&text))
            .await
            .map_err(|e| EmbeddingError::Inference(format!("Inference task failed: {}", e)))?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_pool_ignores_masked_tokens() {
        // Two tokens of width 2; the second is padding.
        let data = [1.0, 3.0, 100.0, 100.0];
        let pooled = mean_pool(&data, 2, 2, &[1, 0]);
        assert_eq!(pooled, vec![1.0, 3.0]);

        let pooled = mean_pool(&data, 2, 2, &[1, 1]);
        assert_eq!(pooled, vec![50.5, 51.5]);
    }

    #[tokio::test]
    async fn test_missing_model_fails_to_load() {
        let embedder = OnnxEmbedder::new(
            "missing",
            PathBuf::from("/nonexistent/model.onnx"),
            PathBuf::from("/nonexistent/tokenizer.json"),
            384,
        );
        assert!(matches!(embedder.embed("hi").await, Err(EmbeddingError::ModelLoad(_))));
    }
}
