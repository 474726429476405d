//! Authenticated request entry point
//!
//! `AuthenticatedClient::execute` is what the rest of the application calls.
//! It decorates the request with the current access token, sends it, and on a
//! first authorization error parks it with the `RefreshCoordinator` until a
//! refresh settles. The caller only ever sees the final outcome.

use std::sync::Arc;
use std::time::Duration;

use session_auth::{
    ACCESS_TOKEN, CredentialStore, REFRESH_TOKEN, Refresher, SetOptions, TokenPair,
};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use transport::{RequestDescriptor, Response, Transport};

use crate::classify::{Disposition, classify};
use crate::coordinator::{PendingRequest, RefreshCoordinator};
use crate::decorator::decorate;
use crate::error::{Error, Result};
use crate::retry::RetryDispatcher;
use crate::terminator::{SessionEnded, SessionTerminator};

/// Upper bound on a single refresh call.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// A refresh that outlives this is treated as failed.
    pub refresh_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

/// HTTP client that keeps the session alive across access-token expiry.
///
/// One instance owns one refresh cycle: share it (it is cheap to wrap in an
/// `Arc`) rather than building one per request.
pub struct AuthenticatedClient {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    dispatcher: RetryDispatcher,
    coordinator: Arc<RefreshCoordinator>,
    terminator: Arc<SessionTerminator>,
}

impl AuthenticatedClient {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        refresher: Arc<dyn Refresher>,
        options: ClientOptions,
    ) -> Self {
        let terminator = Arc::new(SessionTerminator::new(store.clone()));
        let dispatcher = RetryDispatcher::new(transport.clone());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            refresher,
            dispatcher.clone(),
            terminator.clone(),
            options.refresh_timeout,
        ));
        Self {
            store,
            transport,
            dispatcher,
            coordinator,
            terminator,
        }
    }

    /// Send `request` with the current access credential.
    ///
    /// A first 401 is retried once after a credential refresh. If that
    /// refresh fails the result is `Error::SessionEnded`. Every other
    /// failure is returned as the transport reported it.
    ///
    /// A 401 for a token that has since been replaced in the store is
    /// replayed straight away with the stored one, without another refresh.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn execute(&self, request: RequestDescriptor) -> Result<Response> {
        let access_token = self.store.get(ACCESS_TOKEN).await;
        let mut attempt = request.clone();
        decorate(&mut attempt, access_token.as_deref());

        let outcome = self.transport.send(attempt).await;
        match classify(&outcome, false) {
            Disposition::RefreshEligible => {
                let (mut pending, reply) = PendingRequest::new(request);
                match self.store.get(ACCESS_TOKEN).await {
                    Some(current) if access_token.as_deref() != Some(current.as_str()) => {
                        debug!("credential rotated while request was in flight, replaying");
                        pending.mark_retried();
                        self.dispatcher.dispatch(pending, &current);
                    }
                    _ => {
                        debug!("authorization rejected, waiting for credential refresh");
                        self.coordinator.enqueue(pending);
                    }
                }
                reply.await.unwrap_or(Err(Error::Abandoned))
            }
            Disposition::Pass | Disposition::Terminal => outcome.map_err(Error::from),
        }
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<Response> {
        self.execute(RequestDescriptor::get(url)).await
    }

    /// Store a freshly issued pair, e.g. after sign-in.
    pub async fn login(&self, pair: &TokenPair) -> Result<()> {
        let access_options = pair
            .expires_in
            .map(SetOptions::expires_in)
            .unwrap_or_default();
        self.store
            .set(ACCESS_TOKEN, pair.access_token.expose(), access_options)
            .await
            .map_err(Error::Credential)?;
        self.store
            .set(REFRESH_TOKEN, pair.refresh_token.expose(), SetOptions::default())
            .await
            .map_err(Error::Credential)?;
        info!("session started");
        Ok(())
    }

    /// End the session on request. Subscribers see the same signal as for a
    /// failed refresh.
    pub async fn logout(&self) {
        self.terminator.terminate().await;
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEnded> {
        self.terminator.subscribe()
    }

    /// Whether a refresh credential is stored.
    pub async fn is_authenticated(&self) -> bool {
        self.store.get(REFRESH_TOKEN).await.is_some()
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedRefresher, ScriptedTransport, signed_in_store, wait_until};
    use session_auth::MemoryCredentialStore;
    use tokio::sync::broadcast::error::TryRecvError;
    use transport::TransportError;

    struct Harness {
        client: Arc<AuthenticatedClient>,
        transport: Arc<ScriptedTransport>,
        refresher: Arc<ScriptedRefresher>,
        store: Arc<MemoryCredentialStore>,
    }

    async fn harness(refresher: ScriptedRefresher) -> Harness {
        harness_with(refresher, ClientOptions::default()).await
    }

    async fn harness_with(refresher: ScriptedRefresher, options: ClientOptions) -> Harness {
        let store = signed_in_store("T1", "rt_1").await;
        let transport = Arc::new(ScriptedTransport::accepting("T2"));
        let refresher = Arc::new(refresher);
        let client = Arc::new(AuthenticatedClient::new(
            store.clone(),
            transport.clone(),
            refresher.clone(),
            options,
        ));
        Harness {
            client,
            transport,
            refresher,
            store,
        }
    }

    fn spawn_get(
        client: &Arc<AuthenticatedClient>,
        path: &'static str,
    ) -> tokio::task::JoinHandle<Result<Response>> {
        let client = client.clone();
        tokio::spawn(async move { client.get(path).await })
    }

    fn rejected() -> session_auth::Result<TokenPair> {
        Err(session_auth::Error::InvalidCredentials(
            "refresh token expired".into(),
        ))
    }

    #[tokio::test]
    async fn concurrent_rejections_share_one_refresh() {
        let h = harness(ScriptedRefresher::gated(Ok(TokenPair::new("T2", "rt_2")))).await;

        let tasks: Vec<_> = ["/rooms", "/bookings", "/profile"]
            .into_iter()
            .map(|path| spawn_get(&h.client, path))
            .collect();
        wait_until(|| h.client.coordinator().waiting() == 3).await;
        h.refresher.open_gate();

        for (task, path) in tasks.into_iter().zip(["/rooms", "/bookings", "/profile"]) {
            assert_eq!(task.await.unwrap().unwrap().text(), path);
        }
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.transport.urls_sent_with("Bearer T1").len(), 3);
        assert_eq!(h.transport.urls_sent_with("Bearer T2").len(), 3);
    }

    #[tokio::test]
    async fn replays_follow_arrival_order() {
        let h = harness(ScriptedRefresher::gated(Ok(TokenPair::new("T2", "rt_2")))).await;

        let mut tasks = Vec::new();
        for (i, path) in ["/a", "/b", "/c"].into_iter().enumerate() {
            tasks.push(spawn_get(&h.client, path));
            wait_until(|| h.client.coordinator().waiting() == i + 1).await;
        }
        h.refresher.open_gate();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(h.transport.urls_sent_with("Bearer T2"), vec!["/a", "/b", "/c"]);
    }

    #[tokio::test]
    async fn refresh_failure_ends_session_for_every_waiter() {
        let h = harness(ScriptedRefresher::gated(rejected())).await;
        let mut ended = h.client.subscribe();

        let tasks: Vec<_> = ["/a", "/b", "/c"]
            .into_iter()
            .map(|path| spawn_get(&h.client, path))
            .collect();
        wait_until(|| h.client.coordinator().waiting() == 3).await;
        h.refresher.open_gate();

        for task in tasks {
            let err = task.await.unwrap().unwrap_err();
            assert!(err.is_session_ended(), "got: {err:?}");
        }
        wait_until(|| !h.client.coordinator().is_refreshing()).await;

        assert_eq!(ended.try_recv(), Ok(SessionEnded));
        assert_eq!(ended.try_recv(), Err(TryRecvError::Empty));
        assert!(!h.client.is_authenticated().await);
        assert_eq!(h.store.get(ACCESS_TOKEN).await, None);
        assert!(h.transport.urls_sent_with("Bearer T2").is_empty());
    }

    #[tokio::test]
    async fn second_rejection_is_returned_without_another_refresh() {
        let h = harness(ScriptedRefresher::sequence(vec![Ok(TokenPair::new(
            "T2-revoked",
            "rt_2",
        ))]))
        .await;
        let mut ended = h.client.subscribe();

        let err = h.client.get("/rooms").await.unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert!(!err.is_session_ended());
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.transport.calls().len(), 2);
        assert_eq!(ended.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn other_failures_pass_through_untouched() {
        let h = harness(ScriptedRefresher::sequence(Vec::new())).await;

        let err = h.client.get("/broken").await.unwrap_err();
        assert!(
            matches!(
                &err,
                Error::Request(TransportError::Status { status: 500, body }) if body == "boom"
            ),
            "got: {err:?}"
        );

        let err = h.client.get("/offline").await.unwrap_err();
        assert!(
            matches!(err, Error::Request(TransportError::Network(_))),
            "got: {err:?}"
        );

        assert_eq!(h.refresher.calls(), 0);
        assert!(!h.client.coordinator().is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_refresh_times_out_and_ends_session() {
        let h = harness_with(
            ScriptedRefresher::delayed(Ok(TokenPair::new("T2", "rt_2")), Duration::from_secs(60)),
            ClientOptions {
                refresh_timeout: Duration::from_secs(5),
            },
        )
        .await;

        let err = h.client.get("/rooms").await.unwrap_err();
        match err {
            Error::SessionEnded(session_auth::Error::Timeout(after)) => {
                assert_eq!(after, Duration::from_secs(5));
            }
            other => panic!("expected refresh timeout, got: {other:?}"),
        }
        assert!(!h.client.is_authenticated().await);
    }

    #[tokio::test]
    async fn missing_refresh_credential_ends_session() {
        let h = harness(ScriptedRefresher::sequence(Vec::new())).await;
        h.store.remove(REFRESH_TOKEN).await.unwrap();

        let err = h.client.get("/rooms").await.unwrap_err();

        assert!(err.is_session_ended(), "got: {err:?}");
        assert_eq!(h.refresher.calls(), 0);
    }

    #[tokio::test]
    async fn later_requests_use_refreshed_token() {
        let h = harness(ScriptedRefresher::immediate(Ok(TokenPair::new("T2", "rt_2")))).await;

        h.client.get("/a").await.unwrap();
        wait_until(|| !h.client.coordinator().is_refreshing()).await;
        h.client.get("/b").await.unwrap();

        let calls = h.transport.calls();
        let last = calls.last().unwrap();
        assert_eq!(last.url, "/b");
        assert_eq!(last.authorization.as_deref(), Some("Bearer T2"));
        assert_eq!(h.refresher.calls(), 1);
        assert_eq!(h.store.get(REFRESH_TOKEN).await.as_deref(), Some("rt_2"));
    }

    #[tokio::test]
    async fn logout_clears_and_signals_then_login_restores() {
        let h = harness(ScriptedRefresher::sequence(Vec::new())).await;
        let mut ended = h.client.subscribe();

        h.client.logout().await;
        assert_eq!(ended.try_recv(), Ok(SessionEnded));
        assert!(!h.client.is_authenticated().await);

        h.client.login(&TokenPair::new("T2", "rt_2")).await.unwrap();
        assert!(h.client.is_authenticated().await);
        assert_eq!(h.client.get("/rooms").await.unwrap().text(), "/rooms");
        assert_eq!(h.refresher.calls(), 0);
    }

    #[tokio::test]
    async fn aborted_caller_does_not_strand_the_queue() {
        let h = harness(ScriptedRefresher::gated(Ok(TokenPair::new("T2", "rt_2")))).await;

        let gone = spawn_get(&h.client, "/gone");
        wait_until(|| h.client.coordinator().waiting() == 1).await;
        gone.abort();
        let kept = spawn_get(&h.client, "/kept");
        wait_until(|| h.client.coordinator().waiting() == 2).await;

        h.refresher.open_gate();

        assert_eq!(kept.await.unwrap().unwrap().text(), "/kept");
        wait_until(|| !h.client.coordinator().is_refreshing()).await;
        assert!(gone.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn rejection_after_rotation_replays_without_new_refresh() {
        let h = harness(ScriptedRefresher::sequence(Vec::new())).await;

        h.transport.hold();
        let task = spawn_get(&h.client, "/rooms");
        wait_until(|| h.transport.calls().len() == 1).await;
        // Another sign-in replaces T1 while the request is on the wire
        h.client.login(&TokenPair::new("T2", "rt_2")).await.unwrap();
        h.transport.release();

        assert_eq!(task.await.unwrap().unwrap().text(), "/rooms");
        assert_eq!(h.refresher.calls(), 0);
        assert!(!h.client.coordinator().is_refreshing());
        assert_eq!(h.transport.urls_sent_with("Bearer T1"), vec!["/rooms"]);
        assert_eq!(h.transport.urls_sent_with("Bearer T2"), vec!["/rooms"]);
    }

    #[tokio::test]
    async fn stale_replay_rejected_again_is_returned() {
        let h = harness(ScriptedRefresher::sequence(Vec::new())).await;
        h.transport.set_accepted("T3");

        h.transport.hold();
        let task = spawn_get(&h.client, "/rooms");
        wait_until(|| h.transport.calls().len() == 1).await;
        h.client.login(&TokenPair::new("T2", "rt_2")).await.unwrap();
        h.transport.release();

        let err = task.await.unwrap().unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_session_ended());
        assert_eq!(h.refresher.calls(), 0);
        assert_eq!(h.transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn signed_out_request_goes_out_without_credential() {
        let h = harness(ScriptedRefresher::sequence(Vec::new())).await;
        h.client.logout().await;

        let err = h.client.get("/rooms").await.unwrap_err();

        assert!(err.is_session_ended(), "got: {err:?}");
        assert_eq!(h.transport.calls()[0].authorization, None);
    }
}
