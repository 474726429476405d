//! reqwest-backed transport
//!
//! Joins relative request paths onto the configured API base URL, applies a
//! per-request timeout, and maps reqwest outcomes onto `TransportError`.

use std::time::Duration;

use tracing::debug;

use crate::{RequestDescriptor, Response, Transport, TransportError, TransportFuture};

/// Transport that issues requests with a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }

    /// Absolute URLs pass through; paths are appended to the base URL.
    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_owned();
        }
        let base = self.base_url.trim_end_matches('/');
        if url.starts_with('/') {
            format!("{base}{url}")
        } else {
            format!("{base}/{url}")
        }
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: RequestDescriptor) -> TransportFuture {
        let url = self.resolve_url(&request.url);
        let method = request.method;
        let mut builder = self
            .client
            .request(method.clone(), &url)
            .headers(request.headers)
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Box::pin(async move {
            let response = builder.send().await.map_err(map_send_error)?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(map_send_error)?;

            if !status.is_success() {
                debug!(%method, %url, status = status.as_u16(), "request failed");
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }

            Ok(Response {
                status: status.as_u16(),
                headers,
                body,
            })
        })
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Network(e.to_string())
    }
}
