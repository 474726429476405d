//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The config file
//! path itself comes from `--config`, then `CONFIG_PATH`, then the default.
//! Credentials never live in the TOML; they are kept in the credentials file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var that overrides `api.base_url`.
pub const API_URL_ENV: &str = "BOOKING_API_URL";

const DEFAULT_CONFIG_PATH: &str = "booking-client.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
}

/// Storefront API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session settings
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    pub refresh_url: String,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    /// Sent with the refresh grant when the token endpoint expects it
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_timeout() -> u64 {
    30
}

fn default_refresh_timeout() -> u64 {
    10
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AuthConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse, apply env overrides, and validate.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(url) = std::env::var(API_URL_ENV) {
            config.api.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        common::require_http_url("api.base_url", &self.api.base_url)?;
        common::require_http_url("auth.refresh_url", &self.auth.refresh_url)?;

        if self.api.timeout_secs == 0 {
            return Err(common::Error::invalid_field(
                "api.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.auth.refresh_timeout_secs == 0 {
            return Err(common::Error::invalid_field(
                "auth.refresh_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.auth.client_id.as_deref().is_some_and(str::is_empty) {
            return Err(common::Error::invalid_field(
                "auth.client_id",
                "must not be empty when set",
            ));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}
