//! Session teardown and the session-ended signal
//!
//! Runs once per failed refresh cycle (and on explicit logout). Clears both
//! credentials, then broadcasts `SessionEnded` so the host can send the user
//! back to sign-in. Calling it with no credentials stored only re-sends the
//! signal.

use std::sync::Arc;

use session_auth::{ACCESS_TOKEN, CredentialStore, REFRESH_TOKEN};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Capacity of the session-ended channel. Lagging receivers still observe
/// at least one event.
const SIGNAL_CAPACITY: usize = 16;

/// Notification that the session is void. Carries no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnded;

pub struct SessionTerminator {
    store: Arc<dyn CredentialStore>,
    events: broadcast::Sender<SessionEnded>,
}

impl SessionTerminator {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { store, events }
    }

    /// Subscribe to session-ended notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnded> {
        self.events.subscribe()
    }

    /// Clear both credentials and signal the host.
    ///
    /// Store failures are logged; the signal is sent regardless.
    pub async fn terminate(&self) {
        for name in [ACCESS_TOKEN, REFRESH_TOKEN] {
            if let Err(e) = self.store.remove(name).await {
                warn!(name, error = %e, "failed to clear credential");
            }
        }

        metrics::counter!("session_ended_total").increment(1);
        // No subscribers is fine: nobody is listening for sign-in prompts
        let listeners = self.events.send(SessionEnded).unwrap_or(0);
        info!(listeners, "session ended");
    }
}
