//! Authenticated HTTP client with coordinated credential refresh
//!
//! Wraps a `transport::Transport` so that an expired access token costs the
//! caller nothing more than latency:
//!
//! 1. `decorator` attaches `Authorization: Bearer <access>` to each request
//! 2. `classify` decides whether a failed attempt may enter the refresh flow
//! 3. `coordinator` runs at most one refresh at a time and queues everyone else
//! 4. `retry` replays each queued request once with the new access token
//! 5. `terminator` clears the session and notifies the host when refresh fails
//!
//! `AuthenticatedClient` ties these together and is the only type most
//! callers need.

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod decorator;
pub mod error;
pub mod retry;
pub mod terminator;

#[cfg(test)]
mod testing;

pub use classify::{AUTHORIZATION_ERROR_STATUS, Disposition, classify, is_authorization_error};
pub use client::{AuthenticatedClient, ClientOptions, DEFAULT_REFRESH_TIMEOUT};
pub use coordinator::{PendingRequest, RefreshCoordinator};
pub use decorator::decorate;
pub use error::{Error, Result};
pub use retry::RetryDispatcher;
pub use terminator::{SessionEnded, SessionTerminator};
