//! CLI module for podsearch.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// podsearch - semantic search over podcast transcripts
///
/// Tracks podcast episodes, splits their transcripts into timed segments,
/// embeds each segment and answers similarity queries over them.
#[derive(Parser, Debug)]
#[command(name = "podsearch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "PODSEARCH_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the token-authenticated HTTP search API
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start tracking a catalog episode and its show
    Track {
        /// Catalog episode id
        episode_id: String,

        /// Process the transcript right away
        #[arg(long)]
        process: bool,
    },

    /// Process pending episodes of one show or of every show
    Update {
        /// Only update this show
        #[arg(short, long)]
        show: Option<i64>,
    },

    /// Process one pending episode
    Process {
        /// Episode id
        episode_id: i64,
    },

    /// Drop an episode's segments and process it again
    Reprocess {
        /// Episode id
        episode_id: i64,
    },

    /// Search transcript segments
    Search {
        /// Search query
        query: String,

        /// Maximum number of results (defaults to search.default_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity score (defaults to search.default_threshold)
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// List tracked shows and their episodes
    Shows,

    /// Manage API tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum TokenAction {
    /// Issue a new token
    Create {
        /// Label for the token
        name: String,
    },

    /// List tokens
    List,

    /// Revoke every active token with this name
    Revoke {
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "search.default_limit")
        key: String,
        /// Configuration value
        value: String,
    },

    /// Show configuration file path
    Path,
}

/// Log level for a `-v` count: none keeps the configured level (default
/// `warn`), then info, debug and trace.
pub fn log_level(verbose: u8, configured: &str) -> &str {
    match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}
