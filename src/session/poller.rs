//! Waiting for credential material to land in the store.
//!
//! The platform persists credentials through the store asynchronously, so
//! the file may briefly be missing, empty or half-written. The poller only
//! accepts data above a plausibility threshold.

use std::time::Duration;

use crate::error::CredentialError;
use crate::store::{CREDENTIALS_KEY, CredentialStore, SessionId};

/// Polling policy for [`CredentialPoller`].
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Wait after a read that found nothing usable.
    pub interval: Duration,
    /// Wait after a failed read.
    pub error_interval: Duration,
    /// Total reads allowed, failures included.
    pub max_attempts: u32,
    /// Data must be strictly longer than this to count.
    pub min_bytes: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(8),
            error_interval: Duration::from_secs(2),
            max_attempts: 15,
            min_bytes: 100,
        }
    }
}

/// Polls the store for an identity's credential file.
#[derive(Debug, Clone, Default)]
pub struct CredentialPoller {
    config: PollConfig,
}

impl CredentialPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Wait until the store holds plausible credentials for `session_id`.
    pub async fn await_credentials(
        &self,
        store: &dyn CredentialStore,
        session_id: &SessionId,
    ) -> Result<Vec<u8>, CredentialError> {
        let mut attempts = 0;
        while attempts < self.config.max_attempts {
            match store.read(session_id, CREDENTIALS_KEY).await {
                Ok(Some(data)) if data.len() > self.config.min_bytes => {
                    tracing::info!(
                        session_id = %session_id,
                        attempt = attempts + 1,
                        bytes = data.len(),
                        "Credentials captured"
                    );
                    return Ok(data);
                }
                Ok(found) => {
                    tracing::debug!(
                        session_id = %session_id,
                        attempt = attempts + 1,
                        bytes = found.map(|d| d.len()),
                        "Credentials not ready"
                    );
                    tokio::time::sleep(self.config.interval).await;
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        attempt = attempts + 1,
                        error = %e,
                        "Credential read failed"
                    );
                    tokio::time::sleep(self.config.error_interval).await;
                }
            }
            attempts += 1;
        }

        tracing::warn!(
            session_id = %session_id,
            attempts,
            "Gave up waiting for credentials"
        );
        Err(CredentialError::Timeout { attempts })
    }
}
