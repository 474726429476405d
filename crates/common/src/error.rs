//! Configuration errors shared by the client crates and the host binary

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Shorthand for a validation failure on a named config field.
    pub fn invalid_field(field: &str, reason: impl std::fmt::Display) -> Self {
        Self::Config(format!("{field} {reason}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reject URLs that lack an http(s) scheme.
pub fn require_http_url(field: &str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::invalid_field(
            field,
            format_args!("must start with http:// or https://, got: {value}"),
        ))
    }
}
