//! Single replay of a queued request with the refreshed credential

use std::sync::Arc;

use tracing::{Instrument, info_span, warn};
use transport::Transport;

use crate::classify::{Disposition, classify};
use crate::coordinator::PendingRequest;
use crate::decorator::decorate;
use crate::error::Error;

/// Re-issues queued requests once the coordinator has a new access token.
#[derive(Clone)]
pub struct RetryDispatcher {
    transport: Arc<dyn Transport>,
}

impl RetryDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Replay `pending` with `access_token` and resolve its continuation with
    /// whatever that attempt returns.
    ///
    /// The request is handed to the transport before this returns, so calls
    /// made in queue order are dispatched in queue order. The outcome is not
    /// routed back to the coordinator: a second 401 goes straight to the caller.
    pub fn dispatch(&self, pending: PendingRequest, access_token: &str) {
        debug_assert!(pending.retried(), "only retried requests are replayed");
        let (request_id, mut request, reply) = pending.into_parts();
        decorate(&mut request, Some(access_token));

        let span = info_span!(
            "replay",
            %request_id,
            method = %request.method,
            url = %request.url
        );
        let attempt = span.in_scope(|| self.transport.send(request));
        metrics::counter!("session_retries_total").increment(1);

        tokio::spawn(
            async move {
                let outcome = attempt.await;
                if classify(&outcome, true) == Disposition::Terminal {
                    warn!("replayed request rejected again with refreshed credential");
                }
                let _ = reply.send(outcome.map_err(Error::from));
            }
            .instrument(span),
        );
    }
}
