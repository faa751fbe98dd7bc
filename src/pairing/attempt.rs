//! Per-request pairing context.
//!
//! Every stage of the pipeline receives the same [`PairingAttempt`]. The
//! single-use flags live here instead of in ambient state so that the race
//! between the pairing-code path and the connection callbacks is explicit:
//!
//! ```text
//! respond()  ── response_sent: false → true, exactly once
//! cleanup()  ── cleaned_up:    false → true, exactly once
//! mark_delivered() ── delivered: false → true, exactly once
//! expire()   ── grace period over, no further sessions attach
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, watch};

use super::address::PhoneNumber;
use crate::error::PairingError;
use crate::platform::PlatformSession;
use crate::session::cleaner::SessionCleaner;
use crate::session::lifecycle::TeardownHandle;
use crate::store::SessionId;

/// The code returned to the caller.
pub type PairingResponse = Result<String, PairingError>;

/// Connection state of the attempt's current platform session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSessionState {
    Connecting,
    Open,
    ClosedRetryable,
    ClosedTerminal,
}

impl std::fmt::Display for PlatformSessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlatformSessionState::Connecting => write!(f, "connecting"),
            PlatformSessionState::Open => write!(f, "open"),
            PlatformSessionState::ClosedRetryable => write!(f, "closed-retryable"),
            PlatformSessionState::ClosedTerminal => write!(f, "closed-terminal"),
        }
    }
}

/// The platform session currently serving the attempt.
#[derive(Default)]
struct LiveSession {
    current: Option<Arc<dyn PlatformSession>>,
    expired: bool,
}

/// One pairing request and everything that must happen at most once for it.
pub struct PairingAttempt {
    session_id: SessionId,
    target: PhoneNumber,
    created_at: DateTime<Utc>,
    responder: Mutex<Option<oneshot::Sender<PairingResponse>>>,
    response_sent: AtomicBool,
    delivered: AtomicBool,
    cleaned_up: AtomicBool,
    state: watch::Sender<PlatformSessionState>,
    teardown: Mutex<Option<TeardownHandle>>,
    live: Mutex<LiveSession>,
    cleaner: SessionCleaner,
}

impl PairingAttempt {
    /// Create an attempt and the receiver its single response arrives on.
    pub fn new(
        session_id: SessionId,
        target: PhoneNumber,
        cleaner: SessionCleaner,
    ) -> (Self, oneshot::Receiver<PairingResponse>) {
        let (tx, rx) = oneshot::channel();
        let (state, _) = watch::channel(PlatformSessionState::Connecting);
        let attempt = Self {
            session_id,
            target,
            created_at: Utc::now(),
            responder: Mutex::new(Some(tx)),
            response_sent: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
            cleaned_up: AtomicBool::new(false),
            state,
            teardown: Mutex::new(None),
            live: Mutex::new(LiveSession::default()),
            cleaner,
        };
        (attempt, rx)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn target(&self) -> &PhoneNumber {
        &self.target
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Send the response to the caller. Returns `false` if a response was
    /// already sent (the new one is discarded).
    pub fn respond(&self, response: PairingResponse) -> bool {
        if self
            .response_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let sender = self
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                if tx.send(response).is_err() {
                    tracing::debug!(
                        session_id = %self.session_id,
                        "Caller went away before the pairing response"
                    );
                }
            }
            None => {
                tracing::warn!(session_id = %self.session_id, "Pairing responder already taken");
            }
        }
        true
    }

    /// Answer the caller with an error, unless it already got a response.
    pub fn fail(&self, error: PairingError) -> bool {
        self.respond(Err(error))
    }

    pub fn response_sent(&self) -> bool {
        self.response_sent.load(Ordering::Acquire)
    }

    /// Record a successful delivery. Returns `false` if already recorded.
    pub fn mark_delivered(&self) -> bool {
        self.delivered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    /// Remove this attempt's stored state. Only the first call does any work;
    /// later calls return `false` immediately.
    pub async fn cleanup(&self) -> bool {
        if self
            .cleaned_up
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.cleaner.cleanup(&self.session_id).await;
        true
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.cleaned_up.load(Ordering::Acquire)
    }

    pub fn set_state(&self, state: PlatformSessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(
                session_id = %self.session_id,
                from = %previous,
                to = %state,
                "Session state changed"
            );
        }
    }

    pub fn state(&self) -> PlatformSessionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<PlatformSessionState> {
        self.state.subscribe()
    }

    /// Keep the pending teardown so another exit path can disarm it.
    pub fn set_teardown(&self, handle: TeardownHandle) {
        let previous = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    pub fn has_teardown(&self) -> bool {
        self.teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Make `session` the one a teardown closes. Returns `false` once the
    /// grace period is over; the caller must then close `session` itself.
    pub fn attach_session(&self, session: Arc<dyn PlatformSession>) -> bool {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.expired {
            return false;
        }
        live.current = Some(session);
        true
    }

    /// End the grace period and hand out the current session for closing.
    pub fn expire(&self) -> Option<Arc<dyn PlatformSession>> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.expired = true;
        live.current.take()
    }

    pub fn is_expired(&self) -> bool {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .expired
    }

    /// Disarm the pending teardown, if any. A teardown that already fired
    /// runs to completion.
    pub fn cancel_teardown(&self) {
        let handle = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }
}

impl std::fmt::Debug for PairingAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingAttempt")
            .field("session_id", &self.session_id)
            .field("target", &self.target)
            .field("state", &self.state())
            .field("response_sent", &self.response_sent())
            .field("delivered", &self.is_delivered())
            .field("cleaned_up", &self.is_cleaned_up())
            .field("expired", &self.is_expired())
            .finish()
    }
}
