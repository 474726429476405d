//! Credential pair and the refresh operation
//!
//! The refresh operation exchanges the current refresh credential for a new
//! `TokenPair`. `HttpRefresher` performs it against the storefront API's token
//! endpoint with a `grant_type=refresh_token` form POST.
//!
//! Some deployments rotate the refresh token on every use and some don't.
//! Whatever the endpoint returns is stored; when it returns no refresh token
//! the presented one is kept.

use std::future::Future;
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::REFRESH_GRANT_TYPE;
use crate::error::{Error, Result};

/// Access + refresh credential pair. Token content is never inspected.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    /// Seconds until the access token expires, when the issuer says
    pub expires_in: Option<u64>,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: Secret::new(refresh_token.into()),
            expires_in: None,
        }
    }
}

/// Token endpoint response body.
///
/// Accepts both OAuth-style (`access_token`) and short (`access`) field names.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    #[serde(alias = "access")]
    pub access_token: String,
    #[serde(default, alias = "refresh")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Build the new pair, keeping `presented` when no refresh token came back.
    pub fn into_pair(self, presented: &str) -> TokenPair {
        TokenPair {
            access_token: Secret::new(self.access_token),
            refresh_token: Secret::new(
                self.refresh_token
                    .unwrap_or_else(|| presented.to_owned()),
            ),
            expires_in: self.expires_in,
        }
    }
}

/// Boxed future returned by `Refresher::refresh`.
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenPair>> + Send + 'a>>;

/// Exchanges a refresh credential for a new credential pair.
pub trait Refresher: Send + Sync {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a>;
}

/// Refresher that calls the API's token endpoint.
#[derive(Debug, Clone)]
pub struct HttpRefresher {
    client: reqwest::Client,
    endpoint: String,
    client_id: Option<String>,
}

impl HttpRefresher {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

impl Refresher for HttpRefresher {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> RefreshFuture<'a> {
        Box::pin(refresh_token_pair(
            &self.client,
            &self.endpoint,
            self.client_id.as_deref(),
            refresh_token,
        ))
    }
}

/// POST the refresh grant and parse the new pair.
///
/// 401/403 from the endpoint means the refresh credential itself was
/// rejected (expired or revoked) and maps to `InvalidCredentials`.
pub async fn refresh_token_pair(
    client: &reqwest::Client,
    endpoint: &str,
    client_id: Option<&str>,
    refresh: &str,
) -> Result<TokenPair> {
    let mut form = vec![
        ("grant_type", REFRESH_GRANT_TYPE),
        ("refresh_token", refresh),
    ];
    if let Some(client_id) = client_id {
        form.push(("client_id", client_id));
    }

    debug!(endpoint, "requesting token refresh");
    let response = client
        .post(endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    let token = response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))?;

    info!(
        rotated = token.refresh_token.is_some(),
        "token refresh succeeded"
    );
    Ok(token.into_pair(refresh))
}
