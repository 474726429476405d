//! Shared types for the booking storefront client workspace

mod error;
mod secret;

pub use error::{Error, Result, require_http_url};
pub use secret::Secret;
