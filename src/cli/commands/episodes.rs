//! Episode tracking and processing commands.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{EpisodeOutcome, Orchestrator, UpdateSummary};
use anyhow::Result;

/// Start tracking a catalog episode, optionally processing it straight away.
pub async fn run_track(external_id: &str, process: bool, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Fetching episode details...");
    let tracked = orchestrator.track_episode(external_id).await;
    spinner.finish_and_clear();

    let episode_id = tracked?;
    Output::success(&format!("Tracking episode {} as #{}", external_id, episode_id));

    if process {
        process_one(&orchestrator, episode_id).await?;
    }
    Ok(())
}

/// Process one pending episode.
pub async fn run_process(episode_id: i64, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    process_one(&orchestrator, episode_id).await
}

/// Reset an episode to pending and process it again.
pub async fn run_reprocess(episode_id: i64, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    let removed = orchestrator.reset_episode(episode_id)?;
    Output::info(&format!("Removed {} segments from episode #{}", removed, episode_id));

    process_one(&orchestrator, episode_id).await
}

/// Run the update cycle for one show or all shows.
pub async fn run_update(show: Option<i64>, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Processing pending episodes...");
    let summary = match show {
        Some(show_id) => orchestrator.update_show_episodes(show_id).await,
        None => orchestrator.update_all_shows().await,
    };
    spinner.finish_and_clear();

    print_summary(&summary?);
    Ok(())
}

async fn process_one(orchestrator: &Orchestrator, episode_id: i64) -> Result<()> {
    let spinner = Output::spinner(&format!("Processing episode #{}...", episode_id));
    let result = orchestrator.process_episode(episode_id).await;
    spinner.finish_and_clear();

    match result {
        Ok(outcome) => {
            print_outcome(episode_id, &outcome);
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Episode #{} failed: {}", episode_id, e));
            Err(e.into())
        }
    }
}

fn print_outcome(episode_id: i64, outcome: &EpisodeOutcome) {
    Output::success(&format!("Episode #{} completed", episode_id));
    Output::kv("Segments", &outcome.segments_created.to_string());
    if outcome.segments_without_vector > 0 {
        Output::warning(&format!(
            "{} segments have no vector and will not appear in search",
            outcome.segments_without_vector
        ));
    }
}

fn print_summary(summary: &UpdateSummary) {
    Output::header("Update complete");
    Output::kv("Completed", &summary.completed.to_string());
    Output::kv("Failed", &summary.failed.to_string());
    Output::kv("Skipped", &summary.skipped.to_string());
    Output::kv("Segments created", &summary.segments_created.to_string());
}
