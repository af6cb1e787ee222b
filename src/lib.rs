//! podsearch - semantic search over podcast transcripts
//!
//! Fetches episode transcripts from a podcast catalog, splits them into
//! time-bounded segments, embeds each segment and answers nearest-neighbour
//! queries over the stored vectors through a CLI and a token-authenticated
//! HTTP API.
//!
//! # Architecture
//!
//! - `config` - Configuration management
//! - `vector` - The embedding vector type, cosine similarity and codecs
//! - `chunking` - Transcript segmentation and time-range assignment
//! - `embedding` - Embedding backends and the shared embedding model
//! - `vector_store` - Segment, episode, show and token persistence
//! - `search` - Brute-force similarity search
//! - `catalog` - Podcast catalog client (transcripts, episode metadata)
//! - `orchestrator` - Per-episode pipeline and show update cycles
//!
//! # Example
//!
//! ```rust,no_run
//! use podsearch::config::Settings;
//! use podsearch::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let episode_id = orchestrator.track_episode("4d3fe717742d4963a85562e9f84d8c79").await?;
//!     let outcome = orchestrator.process_episode(episode_id).await?;
//!     println!("Created {} segments", outcome.segments_created);
//!
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod orchestrator;
pub mod search;
pub mod vector;
pub mod vector_store;

pub use error::{PodsearchError, Result};
