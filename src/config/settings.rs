//! Configuration settings for podsearch.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub catalog: CatalogSettings,
    pub embedding: EmbeddingSettings,
    pub segmenting: SegmentingSettings,
    pub search: SearchSettings,
    pub database: DatabaseSettings,
    pub server: ServerSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.podsearch".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Podcast catalog (Listen Notes) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// API base URL.
    pub base_url: String,
    /// API key. `LISTENNOTES_API_KEY` takes precedence when set.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: "https://listen-api.listennotes.com/api/v2".to_string(),
            api_key: None,
            timeout_seconds: 30,
        }
    }
}

impl CatalogSettings {
    /// Resolve the API key from the environment or the config file.
    pub fn resolved_api_key(&self) -> Option<String> {
        std::env::var("LISTENNOTES_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai, onnx).
    pub provider: String,
    /// Embedding model identifier.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Input budget in characters; longer text is truncated.
    pub max_input_chars: usize,
    /// Bound on a single inference call, in seconds.
    pub timeout_seconds: u64,
    /// Texts per backend call.
    pub batch_size: usize,
    /// ONNX model file (onnx provider).
    pub model_path: Option<String>,
    /// tokenizer.json file (onnx provider).
    pub tokenizer_path: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 384,
            max_input_chars: crate::embedding::DEFAULT_MAX_INPUT_CHARS,
            timeout_seconds: 60,
            batch_size: crate::embedding::DEFAULT_BATCH_SIZE,
            model_path: None,
            tokenizer_path: None,
        }
    }
}

/// Transcript segmentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentingSettings {
    /// Maximum segment length in characters.
    pub max_segment_length: usize,
}

impl Default for SegmentingSettings {
    fn default() -> Self {
        Self {
            max_segment_length: crate::chunking::DEFAULT_MAX_SEGMENT_LENGTH,
        }
    }
}

/// Similarity search defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Minimum similarity score when the caller gives none.
    pub default_threshold: f32,
    /// Result count when the caller gives none.
    pub default_limit: usize,
    /// Upper bound on a caller-supplied limit.
    pub max_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_threshold: crate::search::DEFAULT_THRESHOLD,
            default_limit: crate::search::DEFAULT_LIMIT,
            max_limit: 100,
        }
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.podsearch/podcasts.db".to_string(),
        }
    }
}

/// HTTP API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Comma-separated allowed origins, or `*`.
    pub cors_origins: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_origins: "*".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PodsearchError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Set a value by dotted key (e.g. `search.default_limit`).
    pub fn set_value(&mut self, key: &str, value: &str) -> crate::error::Result<()> {
        use crate::error::PodsearchError;

        let mut doc: toml::Value = toml::Value::try_from(&*self)
            .map_err(|e| PodsearchError::Config(e.to_string()))?;

        let (section, field) = key
            .split_once('.')
            .ok_or_else(|| PodsearchError::Config(format!("Key must look like section.field: {}", key)))?;

        let table = doc
            .get_mut(section)
            .and_then(|s| s.as_table_mut())
            .ok_or_else(|| PodsearchError::Config(format!("Unknown section: {}", section)))?;

        // Keep the existing type where possible; fall back to a string.
        let parsed = match table.get(field) {
            Some(toml::Value::Integer(_)) => value
                .parse::<i64>()
                .map(toml::Value::Integer)
                .map_err(|_| PodsearchError::Config(format!("{} expects an integer", key)))?,
            Some(toml::Value::Float(_)) => value
                .parse::<f64>()
                .map(toml::Value::Float)
                .map_err(|_| PodsearchError::Config(format!("{} expects a number", key)))?,
            Some(toml::Value::Boolean(_)) => value
                .parse::<bool>()
                .map(toml::Value::Boolean)
                .map_err(|_| PodsearchError::Config(format!("{} expects true or false", key)))?,
            _ => toml::Value::String(value.to_string()),
        };
        table.insert(field.to_string(), parsed);

        *self = doc.try_into().map_err(|e: toml::de::Error| PodsearchError::Config(e.to_string()))?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podsearch")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.database.sqlite_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.segmenting.max_segment_length, 500);
        assert!((settings.search.default_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.search.default_limit, 5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [segmenting]
            max_segment_length = 300

            [embedding]
            provider = "onnx"
            "#,
        )
        .unwrap();

        assert_eq!(settings.segmenting.max_segment_length, 300);
        assert_eq!(settings.embedding.provider, "onnx");
        assert_eq!(settings.embedding.dimensions, 384);
        assert_eq!(settings.server.port, 5000);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = Settings::default();
        settings.search.default_limit = 12;
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.search.default_limit, 12);
    }

    #[test]
    fn test_set_value_keeps_types() {
        let mut settings = Settings::default();
        settings.set_value("search.default_limit", "9").unwrap();
        settings.set_value("search.default_threshold", "0.5").unwrap();
        settings.set_value("embedding.model", "all-MiniLM-L6-v2").unwrap();

        assert_eq!(settings.search.default_limit, 9);
        assert!((settings.search.default_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(settings.embedding.model, "all-MiniLM-L6-v2");

        assert!(settings.set_value("search.default_limit", "many").is_err());
        assert!(settings.set_value("nosuch.key", "1").is_err());
    }
}
