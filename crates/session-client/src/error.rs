//! Error types for authenticated requests

use transport::TransportError;

/// Errors surfaced to callers of `AuthenticatedClient`.
///
/// Ordinary request failures arrive as `Request` exactly as the transport
/// reported them. `SessionEnded` is reserved for a failed credential refresh
/// and should be presented as "please sign in again", not a generic error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Request(#[from] TransportError),

    #[error("session ended: {0}")]
    SessionEnded(session_auth::Error),

    #[error("request abandoned before the credential refresh settled")]
    Abandoned,

    #[error("credential store error: {0}")]
    Credential(session_auth::Error),
}

impl Error {
    /// True when the session is void and the user must sign in again.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Error::SessionEnded(_))
    }

    /// HTTP status of the failed attempt, if the server replied.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Request(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
