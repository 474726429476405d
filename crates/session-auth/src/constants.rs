//! Credential names shared by the store, the coordinator and the host.

/// Store key for the short-lived access credential
pub const ACCESS_TOKEN: &str = "access_token";

/// Store key for the long-lived refresh credential
pub const REFRESH_TOKEN: &str = "refresh_token";

/// `grant_type` sent to the refresh endpoint
pub const REFRESH_GRANT_TYPE: &str = "refresh_token";
