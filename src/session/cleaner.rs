//! Removal of per-identity persisted state.

use std::sync::Arc;

use crate::store::{CredentialStore, SessionId};

/// Deletes everything stored for an identity.
///
/// Safe to call any number of times: a missing entry is a no-op, and errors
/// are logged rather than returned, so every exit path can call it freely.
#[derive(Clone)]
pub struct SessionCleaner {
    store: Arc<dyn CredentialStore>,
}

impl SessionCleaner {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    pub async fn cleanup(&self, session_id: &SessionId) {
        match self.store.remove(session_id).await {
            Ok(true) => tracing::info!(session_id = %session_id, "Removed session state"),
            Ok(false) => tracing::debug!(session_id = %session_id, "No session state to remove"),
            Err(e) => tracing::warn!(
                session_id = %session_id,
                error = %e,
                "Failed to remove session state"
            ),
        }
    }
}

impl std::fmt::Debug for SessionCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCleaner").finish_non_exhaustive()
    }
}
