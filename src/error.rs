//! Error types for podsearch.

use thiserror::Error;

/// Library-level error type for podsearch operations.
#[derive(Error, Debug)]
pub enum PodsearchError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] crate::embedding::EmbeddingError),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for podsearch operations.
pub type Result<T> = std::result::Result<T, PodsearchError>;
