//! Directory-per-identity credential store.
//!
//! ```text
//! <root>/
//!   <session_id>/
//!     creds.json
//!     pre-key-1.json
//!     ...
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{AuthState, CredentialStore, SessionId, validate_key};
use crate::error::StoreError;

/// Credential store backed by one directory per session.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    root: PathBuf,
}

impl FileCredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the files of `id`.
    pub fn session_dir(&self, id: &SessionId) -> PathBuf {
        self.root.join(id.as_str())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load_or_create(&self, id: &SessionId) -> Result<AuthState, StoreError> {
        let dir = self.session_dir(id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut state = AuthState::default();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let data = tokio::fs::read(entry.path()).await?;
            state.files.insert(name, data);
        }

        tracing::debug!(
            session_id = %id,
            files = state.files.len(),
            "Loaded auth state"
        );
        Ok(state)
    }

    async fn write(&self, id: &SessionId, key: &str, data: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        let dir = self.session_dir(id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(key), data).await?;
        Ok(())
    }

    async fn read(&self, id: &SessionId, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        match tokio::fs::read(self.session_dir(id).join(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, id: &SessionId) -> Result<bool, StoreError> {
        match tokio::fs::remove_dir_all(self.session_dir(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
