//! Post-delivery grace period.
//!
//! After the session is delivered the connection stays up for a while so the
//! user's device can finish its own handshake. When the grace period runs
//! out the session is closed and its stored state removed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::pairing::PairingAttempt;
use crate::platform::PlatformSession;

/// Schedules teardown of delivered sessions.
#[derive(Debug, Clone)]
pub struct LifecycleManager {
    grace_period: Duration,
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

impl LifecycleManager {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Close the attempt's session and clean up `attempt` once the grace
    /// period elapses. The session attached to the attempt at that moment is
    /// closed, which may be a reconnected one; `session` is closed only if
    /// none is attached.
    ///
    /// Dropping the returned handle does not disarm the teardown; only
    /// [`TeardownHandle::cancel`] does.
    pub fn schedule_teardown(
        &self,
        session: Arc<dyn PlatformSession>,
        attempt: Arc<PairingAttempt>,
    ) -> TeardownHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let grace = self.grace_period;

        tracing::info!(
            session_id = %attempt.session_id(),
            grace_secs = grace.as_secs(),
            "Teardown scheduled"
        );

        let join = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace) => {}
                Ok(()) = cancel_rx => {
                    tracing::debug!(session_id = %attempt.session_id(), "Teardown cancelled");
                    return;
                }
            }

            tracing::info!(
                session_id = %attempt.session_id(),
                "Grace period over, closing session"
            );
            let session = attempt.expire().unwrap_or(session);
            if let Err(e) = session.close().await {
                tracing::debug!(
                    session_id = %attempt.session_id(),
                    error = %e,
                    "Close during teardown failed"
                );
            }
            attempt.cleanup().await;
        });

        TeardownHandle {
            cancel: cancel_tx,
            join,
        }
    }
}

/// A pending teardown.
#[derive(Debug)]
pub struct TeardownHandle {
    cancel: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl TeardownHandle {
    /// Disarm the teardown. Has no effect once the grace period is over.
    pub fn cancel(self) {
        let _ = self.cancel.send(());
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the teardown task to end, whether it fired or was cancelled.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}
