//! Disposition of a completed request attempt
//!
//! Only an authorization-error status can enter the refresh flow, and only
//! on the first attempt. Everything else (network errors, validation
//! errors, server errors) goes back to the caller untouched.

use transport::{Response, TransportError};

/// HTTP status meaning the access credential was rejected.
pub const AUTHORIZATION_ERROR_STATUS: u16 = 401;

/// What to do with a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Hand the outcome to the caller as-is
    Pass,
    /// First authorization failure: queue behind a credential refresh
    RefreshEligible,
    /// Authorization failure on a replay: give up, no further retries
    Terminal,
}

/// Whether `status` is the authorization-error status.
pub fn is_authorization_error(status: u16) -> bool {
    status == AUTHORIZATION_ERROR_STATUS
}

/// Classify an attempt's outcome. `retried` is true for the single replay.
pub fn classify(outcome: &Result<Response, TransportError>, retried: bool) -> Disposition {
    match outcome {
        Err(e) if e.status().is_some_and(is_authorization_error) => {
            if retried {
                Disposition::Terminal
            } else {
                Disposition::RefreshEligible
            }
        }
        _ => Disposition::Pass,
    }
}
