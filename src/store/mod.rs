//! Per-identity credential storage.
//!
//! Each pairing attempt gets its own identity, and everything the platform
//! persists for that attempt lives under it. Only the session cleaner removes
//! entries.

mod file;
mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

/// Store key of the credential material the pipeline delivers.
pub const CREDENTIALS_KEY: &str = "creds.json";

/// Request-scoped identity. Also used as a directory name, so it is limited
/// to ASCII alphanumerics, `-`, `_` and `.` (never `.` or `..` alone).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing identifier, rejecting anything that is not path-safe.
    pub fn new(raw: impl Into<String>) -> Result<Self, StoreError> {
        let raw = raw.into();
        if is_safe_component(&raw) {
            Ok(Self(raw))
        } else {
            Err(StoreError::InvalidKey(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Auth state loaded for a session: file name → contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub files: BTreeMap<String, Vec<u8>>,
}

impl AuthState {
    pub fn credentials(&self) -> Option<&[u8]> {
        self.files.get(CREDENTIALS_KEY).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Durable keyed storage for per-identity authentication state.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load everything stored for `id`, creating an empty entry if needed.
    async fn load_or_create(&self, id: &SessionId) -> Result<AuthState, StoreError>;

    /// Write (replace) one file for `id`.
    async fn write(&self, id: &SessionId, key: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Read one file for `id`; `None` if it does not exist.
    async fn read(&self, id: &SessionId, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete everything stored for `id`. Returns whether anything existed.
    async fn remove(&self, id: &SessionId) -> Result<bool, StoreError>;
}

fn is_safe_component(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= 128
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && raw != "."
        && raw != ".."
}

/// Validate a file key before it touches a path.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if is_safe_component(key) {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
