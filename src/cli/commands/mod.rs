//! CLI command implementations.

mod config;
mod episodes;
mod search;
mod serve;
mod shows;
mod token;

pub use config::run_config;
pub use episodes::{run_process, run_reprocess, run_track, run_update};
pub use search::run_search;
pub use serve::{router, run_serve, AppState};
pub use shows::run_shows;
pub use token::run_token;
