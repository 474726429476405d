//! Storefront booking client
//!
//! Command-line host for the authenticated API client:
//! 1. Loads configuration and the credentials file
//! 2. Runs one command (`login`, `logout`, or `get`)
//! 3. Keeps the session alive across access-token expiry
//! 4. Reports a void session as "please sign in again"

mod cli;
mod commands;
mod config;
mod metrics;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // JSON logs on stderr with LOG_LEVEL / RUST_LOG support; stdout carries results
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let prometheus_handle = metrics::install_recorder()?;

    let cli = Cli::parse(std::env::args().skip(1))?;

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        refresh_url = %config.auth.refresh_url,
        credentials_path = %config.auth.credentials_path.display(),
        "configuration loaded"
    );

    let client = Arc::new(commands::build_client(&config).await?);
    let watcher = commands::spawn_session_watcher(client.subscribe());

    let mut stdout = std::io::stdout();
    let outcome = commands::run(client, cli.command, &mut stdout).await?;

    if cli.metrics {
        print!("{}", prometheus_handle.render());
    }

    watcher.abort();
    info!(?outcome, "done");
    Ok(outcome.exit_code())
}
