//! API token management.

use crate::cli::{Output, TokenAction};
use crate::config::Settings;
use crate::vector_store::SqliteVectorStore;
use anyhow::Result;

/// Run the token command.
pub fn run_token(action: &TokenAction, settings: Settings) -> Result<()> {
    let store = SqliteVectorStore::new(&settings.sqlite_path())?;

    match action {
        TokenAction::Create { name } => {
            let token = store.create_token(name)?;
            Output::success(&format!("Created token '{}'", token.name));
            println!("{}", token.token);
            Output::warning("Store this token now; send it in the X-API-Token header.");
        }

        TokenAction::List => {
            let tokens = store.list_tokens()?;
            if tokens.is_empty() {
                Output::info("No API tokens.");
                return Ok(());
            }

            Output::header(&format!("API Tokens ({})", tokens.len()));
            for token in &tokens {
                let last_used = token
                    .last_used
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string());
                Output::list_item(&format!(
                    "{} [{}] {} requests, last used {}",
                    token.name,
                    if token.is_active { "active" } else { "revoked" },
                    token.requests_count,
                    last_used
                ));
            }
        }

        TokenAction::Revoke { name } => match store.revoke_token(name)? {
            0 => Output::warning(&format!("No active token named '{}'", name)),
            n => Output::success(&format!("Revoked {} token(s) named '{}'", n, name)),
        },
    }

    Ok(())
}
