//! Entry point for pairing requests.

use std::sync::Arc;

use tokio::sync::oneshot;

use super::address::PhoneNumber;
use super::attempt::{PairingAttempt, PairingResponse};
use crate::error::PairingError;
use crate::session::{ConnectionStateMachine, SessionCleaner};
use crate::store::{CredentialStore, SessionId};

/// Validates requests and starts one pipeline per request.
#[derive(Clone)]
pub struct PairingService {
    machine: Arc<ConnectionStateMachine>,
    cleaner: SessionCleaner,
}

impl PairingService {
    pub fn new(machine: Arc<ConnectionStateMachine>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            machine,
            cleaner: SessionCleaner::new(store),
        }
    }

    /// Validate `raw_number` and spawn a pipeline for it. Returns the attempt
    /// and the receiver its single response arrives on.
    ///
    /// An invalid number fails here, before any session is opened.
    pub fn start(
        &self,
        raw_number: &str,
    ) -> Result<(Arc<PairingAttempt>, oneshot::Receiver<PairingResponse>), PairingError> {
        let target = PhoneNumber::parse(raw_number)?;
        let (attempt, rx) =
            PairingAttempt::new(SessionId::generate(), target, self.cleaner.clone());
        let attempt = Arc::new(attempt);

        tracing::info!(session_id = %attempt.session_id(), "Pairing requested");

        let machine = Arc::clone(&self.machine);
        let task_attempt = Arc::clone(&attempt);
        tokio::spawn(async move {
            machine.run(task_attempt).await;
        });

        Ok((attempt, rx))
    }

    /// Request a pairing code for `raw_number` and wait for the single
    /// response. The pipeline keeps running after this returns.
    pub async fn request_pairing(&self, raw_number: &str) -> Result<String, PairingError> {
        let (attempt, rx) = self.start(raw_number)?;
        match rx.await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!(
                    session_id = %attempt.session_id(),
                    "Pipeline ended without answering"
                );
                Err(PairingError::Aborted)
            }
        }
    }
}

impl std::fmt::Debug for PairingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingService")
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}
