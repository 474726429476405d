//! Single-flight credential refresh with FIFO fan-out
//!
//! Requests that fail with a first authorization error are queued here. The
//! first one to arrive while idle starts exactly one refresh; every later one
//! just waits behind it. When the refresh settles the whole queue is drained
//! in arrival order:
//!
//! - success: the new pair is persisted and each request is handed to the
//!   `RetryDispatcher` with the new access token
//! - failure: each request is rejected with `Error::SessionEnded` and the
//!   `SessionTerminator` runs once for the batch
//!
//! State transitions:
//! - Idle → Refreshing (first enqueue; check-and-set in one critical section)
//! - Refreshing → Idle (after every waiter has been dispatched or rejected)
//!
//! The state lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. The refresh runs on its own task so a caller that goes away
//! cannot strand the rest of the queue, and `refresh_timeout` bounds the
//! whole exchange including credential store access. If the task unwinds
//! before settling, every waiter is released with `Error::Abandoned` and the
//! state returns to idle.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use session_auth::{
    ACCESS_TOKEN, CredentialStore, REFRESH_TOKEN, Refresher, SetOptions, TokenPair,
};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use transport::{RequestDescriptor, Response};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::retry::RetryDispatcher;
use crate::terminator::SessionTerminator;

/// A request parked until the in-flight refresh settles.
#[derive(Debug)]
pub struct PendingRequest {
    id: Uuid,
    request: RequestDescriptor,
    retried: bool,
    reply: oneshot::Sender<Result<Response>>,
}

impl PendingRequest {
    /// Wrap an undecorated request. The receiver resolves with the replay's
    /// outcome or with the refresh failure.
    pub fn new(request: RequestDescriptor) -> (Self, oneshot::Receiver<Result<Response>>) {
        let (reply, rx) = oneshot::channel();
        let pending = Self {
            id: Uuid::new_v4(),
            request,
            retried: false,
            reply,
        };
        (pending, rx)
    }

    /// Whether the single replay has been granted.
    pub fn retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Uuid, RequestDescriptor, oneshot::Sender<Result<Response>>) {
        (self.id, self.request, self.reply)
    }

    fn reject(self, error: Error) {
        // Receiver gone means the caller stopped waiting
        let _ = self.reply.send(Err(error));
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<PendingRequest>,
}

/// Coordinates credential refresh for one client instance.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn Refresher>,
    dispatcher: RetryDispatcher,
    terminator: Arc<SessionTerminator>,
    refresh_timeout: Duration,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        refresher: Arc<dyn Refresher>,
        dispatcher: RetryDispatcher,
        terminator: Arc<SessionTerminator>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::default()),
            store,
            refresher,
            dispatcher,
            terminator,
            refresh_timeout,
        }
    }

    /// Queue a request whose first attempt was rejected with 401.
    ///
    /// Marks it retried, appends it to the queue, and starts a refresh if none
    /// is in flight. Must be called from within a tokio runtime.
    pub fn enqueue(self: &Arc<Self>, mut pending: PendingRequest) {
        pending.mark_retried();
        let request_id = pending.id;

        let start_refresh = {
            let mut state = self.lock_state();
            state.waiters.push_back(pending);
            let start = !state.refreshing;
            state.refreshing = true;
            debug!(
                %request_id,
                waiting = state.waiters.len(),
                refresh_in_flight = !start,
                "queued behind credential refresh"
            );
            start
        };

        if start_refresh {
            info!(%request_id, "access credential rejected, refreshing");
            let coordinator = Arc::clone(self);
            tokio::spawn(async move { coordinator.run_refresh().await });
        }
    }

    /// Whether a refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().refreshing
    }

    /// Number of queued requests.
    pub fn waiting(&self) -> usize {
        self.lock_state().waiters.len()
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_refresh(&self) {
        let mut guard = SettleGuard {
            coordinator: self,
            settled: false,
        };

        // The bound covers the store reads and writes, not just the exchange
        let outcome = tokio::time::timeout(self.refresh_timeout, self.refresh_credentials())
            .await
            .unwrap_or(Err(session_auth::Error::Timeout(self.refresh_timeout)));
        match outcome {
            Ok(pair) => self.settle_success(&pair),
            Err(e) => self.settle_failure(e).await,
        }
        guard.settled = true;
    }

    /// Exchange the stored refresh credential and persist the new pair.
    async fn refresh_credentials(&self) -> session_auth::Result<TokenPair> {
        let presented = self.store.get(REFRESH_TOKEN).await.ok_or_else(|| {
            session_auth::Error::InvalidCredentials("no refresh credential stored".into())
        })?;

        let pair = self.refresher.refresh(&presented).await?;

        let access_options = pair
            .expires_in
            .map(SetOptions::expires_in)
            .unwrap_or_default();
        if let Err(e) = self
            .store
            .set(ACCESS_TOKEN, pair.access_token.expose(), access_options)
            .await
        {
            warn!(error = %e, "failed to persist refreshed access token");
        }
        if let Err(e) = self
            .store
            .set(REFRESH_TOKEN, pair.refresh_token.expose(), SetOptions::default())
            .await
        {
            warn!(error = %e, "failed to persist refreshed refresh token");
        }

        Ok(pair)
    }

    /// Replay every queued request with the new access token, then go idle.
    fn settle_success(&self, pair: &TokenPair) {
        let access_token = pair.access_token.expose();
        let drained = {
            let mut state = self.lock_state();
            let drained = state.waiters.len();
            for pending in state.waiters.drain(..) {
                self.dispatcher.dispatch(pending, access_token);
            }
            state.refreshing = false;
            drained
        };

        metrics::counter!("session_refresh_total", "outcome" => "success").increment(1);
        info!(drained, "credential refresh succeeded, replaying queued requests");
    }

    /// Reject the batch, end the session once, then go idle.
    ///
    /// Requests that queue up while the terminator runs are rejected with
    /// the same error before the state returns to idle.
    async fn settle_failure(&self, error: session_auth::Error) {
        warn!(error = %error, "credential refresh failed, ending session");
        let rejected = {
            let mut state = self.lock_state();
            reject_all(&mut state, &error)
        };

        self.terminator.terminate().await;

        let late = {
            let mut state = self.lock_state();
            let late = reject_all(&mut state, &error);
            state.refreshing = false;
            late
        };

        metrics::counter!("session_refresh_total", "outcome" => "failure").increment(1);
        info!(rejected = rejected + late, "queued requests rejected");
    }
}

/// Returns the coordinator to idle if the refresh task unwinds before it
/// settles, so a panicking refresher or store cannot strand the queue.
struct SettleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let abandoned = {
            let mut state = self.coordinator.lock_state();
            let abandoned = state.waiters.len();
            for pending in state.waiters.drain(..) {
                pending.reject(Error::Abandoned);
            }
            state.refreshing = false;
            abandoned
        };

        metrics::counter!("session_refresh_total", "outcome" => "abandoned").increment(1);
        warn!(abandoned, "credential refresh task ended without settling");
    }
}

fn reject_all(state: &mut RefreshState, error: &session_auth::Error) -> usize {
    let count = state.waiters.len();
    for pending in state.waiters.drain(..) {
        pending.reject(Error::SessionEnded(error.clone()));
    }
    count
}
