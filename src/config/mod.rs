//! Configuration module for podsearch.
//!
//! Handles loading and managing application settings.

mod settings;

pub use settings::{
    CatalogSettings, DatabaseSettings, EmbeddingSettings, GeneralSettings, SearchSettings,
    SegmentingSettings, ServerSettings, Settings,
};
