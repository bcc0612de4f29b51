mod cli;
mod commands;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use idbridge_provider::IdentityProviderFactory;
use idbridge_provider::config::loader::load_config;

use cli::{Cli, Commands};
use output::print_error;

/// Exit status when a password check completes with a rejection.
const EXIT_REJECTED: i32 = 2;

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_REJECTED),
        Err(e) => {
            print_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

/// Returns `false` when the command ran but the answer was negative.
async fn run() -> Result<bool> {
    // Load .env before clap reads env-backed arguments.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    observability::init_tracing_with_level(&cli.log_level);

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    let factory = IdentityProviderFactory::new(config, Vec::new())
        .context("Failed to initialize identity provider")?;
    tracing::debug!(config = ?factory.config(), "Identity provider ready");
    let session = factory.open_session();

    match &cli.command {
        Commands::Users(args) => commands::users::find(&session, args, format).await?,
        Commands::Groups(args) => commands::groups::find(&session, args, format).await?,
        Commands::CheckPassword(args) => {
            return commands::password::check(&session, args, format).await;
        }
    }

    Ok(true)
}
