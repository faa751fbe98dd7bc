//! Connection state machine for one pairing attempt.
//!
//! ```text
//!             ┌──────────── retryable close (flat backoff) ────────────┐
//!             ▼                                                        │
//!   Connecting ──► [pair if unregistered] ──► Open ──► open stage ─────┤
//!                                              │        poll → package │
//!                                              │        → deliver      │
//!                                              │        → teardown     │
//!                                              └─► terminal close ─────┴─► cleanup
//! ```
//!
//! The open stage is polled inside the same `select!` loop that reads
//! connection updates, so a close drops whatever stage was in flight.
//!
//! Delivery does not change how closes are classified: a retryable close
//! still reconnects, and the reconnected session skips the open stage. The
//! grace-period teardown stays armed across reconnects and closes whichever
//! session is attached to the attempt when it fires.

use std::sync::Arc;

use chrono::Utc;
use futures::future::{self, BoxFuture};
use tokio::task::JoinHandle;

use super::delivery::{DeliveryAgent, DeliveryOutcome, DeliveryTemplate};
use super::invite::{self, InviteCode};
use super::lifecycle::LifecycleManager;
use super::packager::package;
use super::poller::CredentialPoller;
use crate::bot;
use crate::config::PipelineTimings;
use crate::error::{
    ConnectionError, CredentialError, DeliveryError, Error, PairingError, PlatformError,
};
use crate::pairing::{PairingAttempt, PairingCoordinator, PlatformSessionState};
use crate::platform::{
    ConnectOptions, ConnectionUpdate, CredentialUpdate, DisconnectReason, Jid, PlatformConnector,
    PlatformHandle, PlatformSession,
};
use crate::store::{CredentialStore, SessionId};

/// How a single platform session ended.
#[derive(Debug)]
enum SessionEnd {
    /// The grace period ran out and the teardown closed the session.
    Finished,
    /// The session could not be set up or paired.
    SetupFailed(PairingError),
    /// A pipeline stage failed and the session was closed locally.
    Abandoned(Error),
    /// The platform closed the connection before delivery.
    Disconnected(ConnectionError),
}

/// Drives the platform sessions of pairing attempts.
pub struct ConnectionStateMachine {
    connector: Arc<dyn PlatformConnector>,
    store: Arc<dyn CredentialStore>,
    coordinator: PairingCoordinator,
    poller: CredentialPoller,
    delivery: DeliveryAgent,
    lifecycle: LifecycleManager,
    group_invite: Option<InviteCode>,
    timings: PipelineTimings,
    max_reconnects: Option<u32>,
}

impl ConnectionStateMachine {
    pub fn new(
        connector: Arc<dyn PlatformConnector>,
        store: Arc<dyn CredentialStore>,
        timings: PipelineTimings,
    ) -> Self {
        Self {
            connector,
            store,
            coordinator: PairingCoordinator::new(timings.pairing_settle),
            poller: CredentialPoller::new(timings.poll.clone()),
            delivery: DeliveryAgent::new(timings.delivery.clone(), DeliveryTemplate::default()),
            lifecycle: LifecycleManager::new(timings.grace_period),
            group_invite: None,
            timings,
            max_reconnects: None,
        }
    }

    pub fn with_template(mut self, template: DeliveryTemplate) -> Self {
        self.delivery = DeliveryAgent::new(self.timings.delivery.clone(), template);
        self
    }

    pub fn with_group_invite(mut self, invite: Option<InviteCode>) -> Self {
        self.group_invite = invite;
        self
    }

    /// Bound the reconnects per attempt. `None` reconnects indefinitely.
    pub fn with_max_reconnects(mut self, max: Option<u32>) -> Self {
        self.max_reconnects = max;
        self
    }

    pub fn with_coordinator(mut self, coordinator: PairingCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    /// Run `attempt` to completion: until the grace period after delivery
    /// ends, or until a terminal failure. Every exit path answers the caller (if nobody has
    /// yet) and cleans up the stored state.
    pub async fn run(&self, attempt: Arc<PairingAttempt>) {
        let mut reconnects: u32 = 0;

        loop {
            attempt.set_state(PlatformSessionState::Connecting);

            match self.run_session(&attempt).await {
                SessionEnd::Disconnected(ConnectionError::Retryable { reason }) => {
                    attempt.set_state(PlatformSessionState::ClosedRetryable);

                    if self.max_reconnects.is_some_and(|max| reconnects >= max) {
                        let err = ConnectionError::ReconnectLimit {
                            attempts: reconnects,
                        };
                        tracing::warn!(
                            session_id = %attempt.session_id(),
                            error = %err,
                            "Reconnect limit reached"
                        );
                        self.finish(&attempt, Some(err.to_string())).await;
                        return;
                    }

                    reconnects += 1;
                    tracing::info!(
                        session_id = %attempt.session_id(),
                        reason = %reason,
                        reconnect = reconnects,
                        backoff_secs = self.timings.reconnect_backoff.as_secs(),
                        "Connection closed, reconnecting"
                    );
                    tokio::time::sleep(self.timings.reconnect_backoff).await;
                }
                SessionEnd::Disconnected(err) => {
                    tracing::warn!(
                        session_id = %attempt.session_id(),
                        error = %err,
                        "Connection closed terminally"
                    );
                    self.finish(&attempt, Some(err.to_string())).await;
                    return;
                }
                SessionEnd::SetupFailed(err) => {
                    tracing::warn!(
                        session_id = %attempt.session_id(),
                        error = %err,
                        "Session setup failed"
                    );
                    attempt.fail(err);
                    self.finish(&attempt, None).await;
                    return;
                }
                SessionEnd::Abandoned(err) => {
                    tracing::warn!(
                        session_id = %attempt.session_id(),
                        error = %err,
                        "Pipeline failed, session abandoned"
                    );
                    self.finish(&attempt, Some(err.to_string())).await;
                    return;
                }
                SessionEnd::Finished => {
                    tracing::info!(session_id = %attempt.session_id(), "Pairing attempt finished");
                    self.finish(&attempt, None).await;
                    return;
                }
            }
        }
    }

    /// Terminal exit: answer a still-waiting caller, disarm the teardown,
    /// remove stored state and publish the terminal state.
    async fn finish(&self, attempt: &PairingAttempt, failure: Option<String>) {
        if let Some(reason) = failure {
            attempt.fail(PairingError::ServiceUnavailable { reason });
        }
        attempt.cancel_teardown();
        attempt.cleanup().await;
        attempt.set_state(PlatformSessionState::ClosedTerminal);
        tracing::debug!(
            session_id = %attempt.session_id(),
            age_secs = (Utc::now() - attempt.created_at()).num_seconds(),
            delivered = attempt.is_delivered(),
            "Pairing attempt closed"
        );
    }

    async fn run_session(&self, attempt: &Arc<PairingAttempt>) -> SessionEnd {
        let session_id = attempt.session_id();
        if attempt.is_expired() {
            return SessionEnd::Finished;
        }

        let auth = match self.store.load_or_create(session_id).await {
            Ok(auth) => auth,
            Err(e) => {
                return SessionEnd::SetupFailed(PairingError::ServiceUnavailable {
                    reason: e.to_string(),
                });
            }
        };

        let options = ConnectOptions::new(session_id.clone(), auth.files)
            .with_timeouts(self.timings.connect_timeout, self.timings.keep_alive_interval);
        let PlatformHandle {
            session,
            mut connection,
            mut credentials,
            messages,
        } = match self.connector.connect(options).await {
            Ok(handle) => handle,
            Err(e) => {
                return SessionEnd::SetupFailed(PairingError::ServiceUnavailable {
                    reason: e.to_string(),
                });
            }
        };

        tracing::debug!(
            session_id = %session_id,
            registered = session.is_registered(),
            "Platform session created"
        );

        if !attempt.attach_session(session.clone()) {
            tracing::debug!(session_id = %session_id, "Grace period over during reconnect");
            close_quietly(session.as_ref(), session_id).await;
            return SessionEnd::Finished;
        }

        if !session.is_registered() {
            match self
                .coordinator
                .request_pairing(session.as_ref(), attempt.target())
                .await
            {
                Ok(code) => {
                    tracing::info!(session_id = %session_id, "Pairing code issued");
                    attempt.respond(Ok(code));
                }
                Err(e) => {
                    close_quietly(session.as_ref(), session_id).await;
                    return SessionEnd::SetupFailed(e);
                }
            }
        }

        let mut messages = Some(messages);
        let mut bot_task: Option<JoinHandle<()>> = None;
        let mut stage: Option<BoxFuture<'_, Result<(), Error>>> = None;
        let mut opened = false;
        let mut credentials_open = true;

        let end = loop {
            tokio::select! {
                biased;

                // Pending credential writes go first so they are on disk
                // before a close is acted on.
                update = credentials.recv(), if credentials_open => match update {
                    Some(update) => self.persist_credentials(session_id, update).await,
                    None => credentials_open = false,
                },

                update = connection.recv() => match update {
                    Some(ConnectionUpdate::Open) => {
                        attempt.set_state(PlatformSessionState::Open);
                        if !opened {
                            opened = true;
                            tracing::info!(session_id = %session_id, "Connection open");
                            if let Some(messages) = messages.take() {
                                bot_task = Some(bot::spawn_responder(session.clone(), messages));
                            }
                            if let Some(code) = self.group_invite.clone() {
                                let session = session.clone();
                                tokio::spawn(async move {
                                    invite::join_group(session.as_ref(), &code).await;
                                });
                            }
                            if attempt.is_delivered() {
                                tracing::debug!(
                                    session_id = %session_id,
                                    "Already delivered, skipping open stage"
                                );
                            } else {
                                let open_stage = self.open_stage(attempt.clone(), session.clone());
                                stage = Some(Box::pin(open_stage));
                            }
                        }
                    }
                    Some(ConnectionUpdate::Connecting) => {
                        tracing::debug!(session_id = %session_id, "Connecting");
                    }
                    Some(ConnectionUpdate::Closed(reason)) => {
                        break classify_close(attempt, reason);
                    }
                    None => break classify_close(attempt, DisconnectReason::unknown()),
                },

                result = poll_stage(&mut stage) => {
                    stage = None;
                    match result {
                        Ok(()) => {
                            let handle = self
                                .lifecycle
                                .schedule_teardown(session.clone(), attempt.clone());
                            attempt.set_teardown(handle);
                        }
                        Err(e) => {
                            close_quietly(session.as_ref(), session_id).await;
                            break SessionEnd::Abandoned(e);
                        }
                    }
                }
            }
        };

        if let Some(task) = bot_task {
            task.abort();
        }

        // A retryable close during the post-delivery settle dropped the stage
        // before it could arm the teardown.
        let reconnecting = matches!(
            end,
            SessionEnd::Disconnected(ConnectionError::Retryable { .. })
        );
        if reconnecting && attempt.is_delivered() && !attempt.has_teardown() {
            let handle = self.lifecycle.schedule_teardown(session, attempt.clone());
            attempt.set_teardown(handle);
        }
        end
    }

    /// Poll, package, deliver. Runs once per opened connection.
    async fn open_stage(
        &self,
        attempt: Arc<PairingAttempt>,
        session: Arc<dyn PlatformSession>,
    ) -> Result<(), Error> {
        let session_id = attempt.session_id();

        tokio::time::sleep(self.timings.open_settle).await;
        if !session.is_alive() {
            return Err(CredentialError::SessionClosed.into());
        }

        let material = self
            .poller
            .await_credentials(self.store.as_ref(), session_id)
            .await?;
        let payload = package(&material)?;

        tokio::time::sleep(self.timings.pre_send).await;
        if !session.is_alive() {
            return Err(DeliveryError::SessionClosed.into());
        }

        let target = session
            .user_id()
            .as_deref()
            .and_then(Jid::normalized_user)
            .ok_or_else(|| PlatformError::Protocol("session has no user id".to_string()))?;

        match self.delivery.deliver(session.as_ref(), &target, &payload).await {
            DeliveryOutcome::Delivered { .. } => {}
            DeliveryOutcome::Failed {
                attempts,
                last_error,
            } => {
                return Err(DeliveryError::Failed {
                    attempts,
                    last_error,
                }
                .into());
            }
        }

        attempt.mark_delivered();
        tokio::time::sleep(self.timings.post_delivery_settle).await;
        Ok(())
    }

    async fn persist_credentials(&self, session_id: &SessionId, update: CredentialUpdate) {
        match self.store.write(session_id, &update.key, &update.data).await {
            Ok(()) => tracing::debug!(
                session_id = %session_id,
                key = %update.key,
                bytes = update.data.len(),
                "Credentials persisted"
            ),
            Err(e) => tracing::warn!(
                session_id = %session_id,
                key = %update.key,
                error = %e,
                "Failed to persist credentials"
            ),
        }
    }
}

impl std::fmt::Debug for ConnectionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStateMachine")
            .field("timings", &self.timings)
            .field("max_reconnects", &self.max_reconnects)
            .field("group_invite", &self.group_invite)
            .finish_non_exhaustive()
    }
}

/// Close `session`, logging instead of propagating a failure.
async fn close_quietly(session: &dyn PlatformSession, session_id: &SessionId) {
    if let Err(e) = session.close().await {
        tracing::debug!(
            session_id = %session_id,
            error = %e,
            "Closing platform session failed"
        );
    }
}

fn classify_close(attempt: &PairingAttempt, reason: DisconnectReason) -> SessionEnd {
    tracing::info!(
        session_id = %attempt.session_id(),
        status_code = reason.status_code,
        reason = %reason,
        delivered = attempt.is_delivered(),
        "Connection closed"
    );
    if attempt.is_expired() {
        SessionEnd::Finished
    } else if reason.is_terminal() {
        SessionEnd::Disconnected(ConnectionError::Terminal { reason })
    } else {
        SessionEnd::Disconnected(ConnectionError::Retryable { reason })
    }
}

/// Resolve with the stage's result, or never if no stage is running.
async fn poll_stage(stage: &mut Option<BoxFuture<'_, Result<(), Error>>>) -> Result<(), Error> {
    match stage.as_mut() {
        Some(fut) => fut.await,
        None => future::pending().await,
    }
}
