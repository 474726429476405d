//! In-process fakes for the transport and refresh collaborators

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use session_auth::{
    ACCESS_TOKEN, CredentialStore, MemoryCredentialStore, REFRESH_TOKEN, RefreshFuture,
    Refresher, SetOptions, StoreFuture, TokenPair,
};
use tokio::sync::{Notify, watch};
use transport::{RequestDescriptor, Response, Transport, TransportError, TransportFuture};

/// One request as the transport saw it.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub authorization: Option<String>,
}

/// Transport that accepts exactly one bearer token.
///
/// `/broken` always returns 500 and `/offline` always fails at the network
/// level. Every other path returns 200 with the path as body when the
/// request carries `Bearer <accepted>`, and 401 otherwise.
///
/// The reply is decided when the request is sent. `hold` keeps replies from
/// being delivered until `release`.
pub struct ScriptedTransport {
    accepted: Mutex<Option<String>>,
    calls: Mutex<Vec<Call>>,
    open: watch::Sender<bool>,
}

impl ScriptedTransport {
    pub fn accepting(token: &str) -> Self {
        Self {
            accepted: Mutex::new(Some(token.to_owned())),
            calls: Mutex::new(Vec::new()),
            open: watch::channel(true).0,
        }
    }

    pub fn rejecting_all() -> Self {
        Self {
            accepted: Mutex::new(None),
            ..Self::accepting("")
        }
    }

    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn set_accepted(&self, token: &str) {
        *self.accepted.lock().unwrap() = Some(token.to_owned());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// URLs sent with the given Authorization value, in send order.
    pub fn urls_sent_with(&self, authorization: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.authorization.as_deref() == Some(authorization))
            .map(|c| c.url)
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: RequestDescriptor) -> TransportFuture {
        let authorization = request
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.calls.lock().unwrap().push(Call {
            url: request.url.clone(),
            authorization: authorization.clone(),
        });

        let accepted = self
            .accepted
            .lock()
            .unwrap()
            .as_ref()
            .map(|t| format!("Bearer {t}"));
        let outcome = match request.url.as_str() {
            "/broken" => Err(TransportError::Status {
                status: 500,
                body: "boom".into(),
            }),
            "/offline" => Err(TransportError::Network("connection refused".into())),
            url if accepted.is_some() && authorization == accepted => Ok(Response {
                status: 200,
                headers: HeaderMap::new(),
                body: Bytes::from(url.to_owned()),
            }),
            _ => Err(TransportError::Status {
                status: 401,
                body: r#"{"detail":"token expired"}"#.into(),
            }),
        };

        let mut open = self.open.subscribe();
        Box::pin(async move {
            loop {
                if *open.borrow_and_update() {
                    break;
                }
                if open.changed().await.is_err() {
                    break;
                }
            }
            tokio::task::yield_now().await;
            outcome
        })
    }
}

/// Refresher that replays scripted outcomes in order.
///
/// A gated refresher parks until `open_gate` is called, which lets a test
/// pile up waiters before the refresh settles.
pub struct ScriptedRefresher {
    outcomes: Mutex<VecDeque<session_auth::Result<TokenPair>>>,
    gate: Option<Notify>,
    delay: Option<Duration>,
    panic_once: AtomicBool,
    calls: AtomicUsize,
    presented: Mutex<Vec<String>>,
}

impl ScriptedRefresher {
    pub fn sequence(outcomes: Vec<session_auth::Result<TokenPair>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            gate: None,
            delay: None,
            panic_once: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            presented: Mutex::new(Vec::new()),
        }
    }

    pub fn immediate(outcome: session_auth::Result<TokenPair>) -> Self {
        Self::sequence(vec![outcome])
    }

    pub fn gated(outcome: session_auth::Result<TokenPair>) -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::immediate(outcome)
        }
    }

    pub fn delayed(outcome: session_auth::Result<TokenPair>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::immediate(outcome)
        }
    }

    /// Panics on the first call, then replays `then`.
    pub fn panicking_once(then: session_auth::Result<TokenPair>) -> Self {
        Self {
            panic_once: AtomicBool::new(true),
            ..Self::immediate(then)
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented, in call order.
    pub fn presented(&self) -> Vec<String> {
        self.presented.lock().unwrap().clone()
    }
}

impl Refresher for ScriptedRefresher {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.presented
                .lock()
                .unwrap()
                .push(refresh_token.to_owned());
            if self.panic_once.swap(false, Ordering::SeqCst) {
                panic!("refresher bug");
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.outcomes.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(session_auth::Error::TokenExchange(
                    "no scripted outcome".into(),
                ))
            })
        })
    }
}

/// Store whose writes take `delay` to complete.
pub struct SlowStore {
    inner: Arc<MemoryCredentialStore>,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: Arc<MemoryCredentialStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl CredentialStore for SlowStore {
    fn get<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
        self.inner.get(name)
    }

    fn set<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        options: SetOptions,
    ) -> StoreFuture<'a, session_auth::Result<()>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.inner.set(name, value, options).await
        })
    }

    fn remove<'a>(&'a self, name: &'a str) -> StoreFuture<'a, session_auth::Result<()>> {
        self.inner.remove(name)
    }
}

/// Memory store holding a signed-in session.
pub async fn signed_in_store(access: &str, refresh: &str) -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    store
        .set(ACCESS_TOKEN, access, SetOptions::default())
        .await
        .unwrap();
    store
        .set(REFRESH_TOKEN, refresh, SetOptions::default())
        .await
        .unwrap();
    store
}

/// Yield to other tasks until `condition` holds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
