//! Shows command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::vector_store::{SqliteVectorStore, VectorStore};
use anyhow::Result;

/// List tracked shows with their episodes.
pub async fn run_shows(settings: Settings) -> Result<()> {
    let store = SqliteVectorStore::new(&settings.sqlite_path())?;
    let shows = store.list_shows()?;

    if shows.is_empty() {
        Output::info("No shows tracked yet. Use 'podsearch track <episode_id>' to add one.");
        return Ok(());
    }

    Output::header(&format!("Tracked Shows ({})", shows.len()));
    for show in &shows {
        println!();
        Output::list_item(&format!("{} ({})", show.title, show.external_id));
        if let Some(updated) = show.last_updated {
            Output::kv("Last updated", &updated.format("%Y-%m-%d %H:%M").to_string());
        }
        for episode in store.list_episodes(show.id)? {
            Output::episode_info(
                episode.id,
                &episode.title,
                episode.transcript_status.as_str(),
                episode.duration,
            );
        }
    }

    println!();
    Output::kv("Total segments", &store.segment_count().await?.to_string());
    Ok(())
}
