//! Credential storage for the session's access and refresh tokens
//!
//! `CredentialStore` is the narrow get/set/remove interface the session layer
//! consumes. Two implementations ship with the crate:
//!
//! - `MemoryCredentialStore` keeps values in process memory (tests, short-lived
//!   hosts).
//! - `FileCredentialStore` persists a JSON map of name → value to disk. All
//!   writes use atomic temp-file + rename, and a tokio Mutex serializes writers.
//!
//! `SetOptions::expires_at` is honored by both stores: an entry past its
//! expiry reads as absent. Nothing else about the value is interpreted.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by `CredentialStore` methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Options attached to a stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Absolute expiry as a unix timestamp in milliseconds
    pub expires_at: Option<u64>,
}

impl SetOptions {
    /// Expire `secs` seconds from now. Lifetimes too large to represent
    /// saturate to "never expires".
    pub fn expires_in(secs: u64) -> Self {
        Self {
            expires_at: Some(now_millis().saturating_add(secs.saturating_mul(1000))),
        }
    }
}

/// Persists, retrieves and removes named credentials.
///
/// Boxed futures keep the trait dyn-compatible (`Arc<dyn CredentialStore>`).
pub trait CredentialStore: Send + Sync {
    /// Current value, or `None` if absent or expired.
    fn get<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Insert or replace a value.
    fn set<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        options: SetOptions,
    ) -> StoreFuture<'a, Result<()>>;

    /// Remove a value. Removing an absent name succeeds.
    fn remove<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Result<()>>;
}

/// A stored value with its optional expiry.
#[derive(Clone, Serialize, Deserialize)]
struct StoredCredential {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
}

impl StoredCredential {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredential")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn live_value(state: &HashMap<String, StoredCredential>, name: &str) -> Option<String> {
    state
        .get(name)
        .filter(|c| c.is_live(now_millis()))
        .map(|c| c.value.clone())
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<HashMap<String, StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { live_value(&*self.state.lock().await, name) })
    }

    fn set<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        options: SetOptions,
    ) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            self.state.lock().await.insert(
                name.to_owned(),
                StoredCredential {
                    value: value.to_owned(),
                    expires_at: options.expires_at,
                },
            );
            Ok(())
        })
    }

    fn remove<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            self.state.lock().await.remove(name);
            Ok(())
        })
    }
}

/// Credential store backed by a JSON file.
///
/// Reads are served from memory; every mutation rewrites the file while
/// holding the lock.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<String, StoredCredential>>,
}

impl FileCredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (signed-out cold start).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let credentials: HashMap<String, StoredCredential> = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), entries = credentials.len(), "loaded credentials");
            credentials
        } else {
            info!(path = %path.display(), "credential file not found, starting signed out");
            let state = HashMap::new();
            write_atomic(&path, &state).await?;
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

}

impl CredentialStore for FileCredentialStore {
    fn get<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move { live_value(&*self.state.lock().await, name) })
    }

    fn set<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        options: SetOptions,
    ) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.insert(
                name.to_owned(),
                StoredCredential {
                    value: value.to_owned(),
                    expires_at: options.expires_at,
                },
            );
            debug!(name, "stored credential");
            write_atomic(&self.path, &state).await
        })
    }

    fn remove<'a>(&'a self, name: &'a str) -> StoreFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if state.remove(name).is_some() {
                debug!(name, "removed credential");
                write_atomic(&self.path, &state).await?;
            }
            Ok(())
        })
    }
}

/// Write credentials to a file atomically with 0600 permissions (unix).
async fn write_atomic(path: &Path, data: &HashMap<String, StoredCredential>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
