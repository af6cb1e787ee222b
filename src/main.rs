//! podsearch CLI entry point.

use anyhow::Result;
use clap::Parser;
use podsearch::cli::{commands, log_level, Cli, Commands};
use podsearch::config::Settings;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = cli
        .config
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(Settings::default_config_path);
    let settings = Settings::load_from(Some(&config_path))?;

    // Initialize logging
    let log_level = log_level(cli.verbose, &settings.general.log_level);

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("podsearch={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Ensure the data directory and database directory exist
    std::fs::create_dir_all(settings.data_dir())?;
    if let Some(parent) = settings.sqlite_path().parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Execute command
    match &cli.command {
        Commands::Serve { host, port } => {
            commands::run_serve(host.clone(), *port, settings).await?;
        }

        Commands::Track { episode_id, process } => {
            commands::run_track(episode_id, *process, settings).await?;
        }

        Commands::Update { show } => {
            commands::run_update(*show, settings).await?;
        }

        Commands::Process { episode_id } => {
            commands::run_process(*episode_id, settings).await?;
        }

        Commands::Reprocess { episode_id } => {
            commands::run_reprocess(*episode_id, settings).await?;
        }

        Commands::Search { query, limit, threshold } => {
            commands::run_search(query, *limit, *threshold, settings).await?;
        }

        Commands::Shows => {
            commands::run_shows(settings).await?;
        }

        Commands::Token { action } => {
            commands::run_token(action, settings)?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings, config_path)?;
        }
    }

    Ok(())
}
