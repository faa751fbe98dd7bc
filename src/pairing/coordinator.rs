//! Pairing code requests.

use std::time::Duration;

use super::address::PhoneNumber;
use super::codes::generate_aux_code;
use crate::error::{PairingError, PlatformError};
use crate::platform::PlatformSession;

/// Requests a pairing code from an unregistered session.
#[derive(Debug, Clone)]
pub struct PairingCoordinator {
    /// Wait between opening the session and asking for a code.
    settle_delay: Duration,
    /// Whether to offer a client-chosen auxiliary code on the first call.
    use_aux_code: bool,
}

impl PairingCoordinator {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            use_aux_code: true,
        }
    }

    /// Skip the auxiliary code and only use the simple call form.
    pub fn without_aux_code(mut self) -> Self {
        self.use_aux_code = false;
        self
    }

    /// Ask the platform for a pairing code tied to `target`.
    ///
    /// The richer call form (with an auxiliary code) is tried first. If the
    /// platform rejects it, the simple form is tried exactly once more. This
    /// is a compatibility fallback, not a retry loop.
    pub async fn request_pairing(
        &self,
        session: &dyn PlatformSession,
        target: &PhoneNumber,
    ) -> Result<String, PairingError> {
        tokio::time::sleep(self.settle_delay).await;

        if !session.is_alive() {
            return Err(PairingError::ServiceUnavailable {
                reason: "session closed before the pairing request".to_string(),
            });
        }

        if self.use_aux_code {
            let aux = generate_aux_code();
            match session
                .request_pairing_code(target.as_str(), Some(&aux))
                .await
            {
                Ok(code) => return Ok(code),
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        "Pairing request with auxiliary code rejected, falling back"
                    );
                }
            }
        }

        session
            .request_pairing_code(target.as_str(), None)
            .await
            .map_err(|e| match e {
                PlatformError::Rejected { reason, .. } => {
                    PairingError::PairingRequestFailed { reason }
                }
                other => PairingError::ServiceUnavailable {
                    reason: other.to_string(),
                },
            })
    }
}
