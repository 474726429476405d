//! Client construction and command execution

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use session_auth::{FileCredentialStore, HttpRefresher, TokenPair};
use session_client::{AuthenticatedClient, ClientOptions, SessionEnded};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use transport::ReqwestTransport;

use crate::cli::Command;
use crate::config::Config;

pub const SESSION_ENDED_MESSAGE: &str = "session ended, please sign in again";

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// At least one request failed for a reason other than session end
    Failed,
    /// The session is void; the user has to sign in again
    SessionEnded,
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Success => ExitCode::SUCCESS,
            Outcome::Failed => ExitCode::from(1),
            Outcome::SessionEnded => ExitCode::from(2),
        }
    }
}

/// Wire the file-backed store, reqwest transport and HTTP refresher together.
pub async fn build_client(config: &Config) -> Result<AuthenticatedClient> {
    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let store = FileCredentialStore::load(config.auth.credentials_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open credentials at {}",
                config.auth.credentials_path.display()
            )
        })?;

    let transport = ReqwestTransport::new(
        http.clone(),
        config.api.base_url.clone(),
        config.api.timeout(),
    );

    let mut refresher = HttpRefresher::new(http, config.auth.refresh_url.clone());
    if let Some(client_id) = &config.auth.client_id {
        refresher = refresher.with_client_id(client_id.clone());
    }

    Ok(AuthenticatedClient::new(
        Arc::new(store),
        Arc::new(transport),
        Arc::new(refresher),
        ClientOptions {
            refresh_timeout: config.auth.refresh_timeout(),
        },
    ))
}

/// Log every session-ended notification until the client goes away.
pub fn spawn_session_watcher(mut events: broadcast::Receiver<SessionEnded>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEnded) => warn!("session ended, sign-in required"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session-ended notifications lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Execute `command`, writing human-readable results to `out`.
pub async fn run(
    client: Arc<AuthenticatedClient>,
    command: Command,
    out: &mut impl Write,
) -> Result<Outcome> {
    match command {
        Command::Login { access, refresh } => {
            client
                .login(&TokenPair::new(access, refresh))
                .await
                .context("failed to store credentials")?;
            writeln!(out, "signed in")?;
            Ok(Outcome::Success)
        }
        Command::Logout => {
            client.logout().await;
            writeln!(out, "signed out")?;
            Ok(Outcome::Success)
        }
        Command::Get { paths } => get_all(client, paths, out).await,
    }
}

async fn get_all(
    client: Arc<AuthenticatedClient>,
    paths: Vec<String>,
    out: &mut impl Write,
) -> Result<Outcome> {
    info!(requests = paths.len(), "issuing requests");
    let tasks: Vec<_> = paths
        .into_iter()
        .map(|path| {
            let client = client.clone();
            tokio::spawn(async move {
                let result = client.get(path.clone()).await;
                (path, result)
            })
        })
        .collect();

    let mut outcome = Outcome::Success;
    for task in tasks {
        let (path, result) = task.await.context("request task failed")?;
        match result {
            Ok(response) => {
                writeln!(out, "{path} {}", response.status)?;
                writeln!(out, "{}", response.text())?;
            }
            Err(e) if e.is_session_ended() => outcome = Outcome::SessionEnded,
            Err(e) => {
                writeln!(out, "{path} error: {e}")?;
                if outcome == Outcome::Success {
                    outcome = Outcome::Failed;
                }
            }
        }
    }

    if outcome == Outcome::SessionEnded {
        writeln!(out, "{SESSION_ENDED_MESSAGE}")?;
    }
    Ok(outcome)
}
