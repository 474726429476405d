//! Session credentials for the storefront API client
//!
//! Owns the pieces of the session the coordinator treats as collaborators:
//! the credential store (where the access and refresh tokens live) and the
//! refresh operation (how a refresh token becomes a new pair). Standalone
//! library with no dependency on the HTTP client layer.
//!
//! Credential lifecycle:
//! 1. Host signs in and stores a `TokenPair` under `ACCESS_TOKEN` / `REFRESH_TOKEN`
//! 2. Requests read `ACCESS_TOKEN` from the `CredentialStore`
//! 3. On an authorization failure the coordinator calls `Refresher::refresh`
//! 4. The new pair overwrites both entries
//! 5. On refresh failure or logout both entries are removed

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{
    CredentialStore, FileCredentialStore, MemoryCredentialStore, SetOptions, StoreFuture,
};
pub use error::{Error, Result};
pub use token::{
    HttpRefresher, RefreshFuture, Refresher, TokenPair, TokenResponse, refresh_token_pair,
};
