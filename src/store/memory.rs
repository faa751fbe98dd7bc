//! In-memory credential store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{AuthState, CredentialStore, SessionId, validate_key};
use crate::error::StoreError;

/// Credential store kept entirely in memory. State is lost on restart, which
/// is acceptable for short-lived pairing attempts.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    sessions: Arc<RwLock<HashMap<SessionId, BTreeMap<String, Vec<u8>>>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything is stored for `id`.
    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// All identities currently stored.
    pub async fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load_or_create(&self, id: &SessionId) -> Result<AuthState, StoreError> {
        let mut sessions = self.sessions.write().await;
        let files = sessions.entry(id.clone()).or_default().clone();
        Ok(AuthState { files })
    }

    async fn write(&self, id: &SessionId, key: &str, data: &[u8]) -> Result<(), StoreError> {
        validate_key(key)?;
        self.sessions
            .write()
            .await
            .entry(id.clone())
            .or_default()
            .insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn read(&self, id: &SessionId, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        validate_key(key)?;
        Ok(self
            .sessions
            .read()
            .await
            .get(id)
            .and_then(|files| files.get(key))
            .cloned())
    }

    async fn remove(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.sessions.write().await.remove(id).is_some())
    }
}
