//! Narrow interface to the messaging platform.
//!
//! The platform connection is a broad, event-driven object. The pipeline
//! only needs a handful of its capabilities, so it sees the platform through
//! two traits:
//!
//! ```text
//! PlatformConnector::connect(ConnectOptions)
//!        │
//!        ▼
//! PlatformHandle ──► session: Arc<dyn PlatformSession>   (request code, send, close)
//!                ├─► connection:  UnboundedReceiver<ConnectionUpdate>
//!                ├─► credentials: UnboundedReceiver<CredentialUpdate>
//!                └─► messages:    UnboundedReceiver<IncomingMessage>
//! ```
//!
//! Subscriptions are unbounded so a slow consumer never stalls the
//! connector's reader while a request is in flight.

pub mod bridge;
pub mod jid;
pub mod message;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::PlatformError;
use crate::store::SessionId;

pub use bridge::{BridgeConfig, BridgeConnector};
pub use jid::Jid;
pub use message::{Button, IncomingMessage, InteractiveMessage, OutgoingMessage};

/// Status code the platform reports for an explicit logout.
pub const LOGGED_OUT: u16 = 401;

/// Reason reported by the platform when a connection closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Numeric status code, when the platform supplied one.
    pub status_code: Option<u16>,
}

impl DisconnectReason {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code: Some(status_code),
        }
    }

    /// A close with no reported status.
    pub fn unknown() -> Self {
        Self { status_code: None }
    }

    /// Whether the session can never be resumed (explicit logout).
    pub fn is_terminal(&self) -> bool {
        self.status_code == Some(LOGGED_OUT)
    }

    /// Human-readable label for logs.
    pub fn label(&self) -> &'static str {
        match self.status_code {
            Some(401) => "logged out",
            Some(403) => "forbidden",
            Some(408) => "timed out",
            Some(411) => "multi-device mismatch",
            Some(428) => "connection closed",
            Some(440) => "connection replaced",
            Some(500) => "bad session",
            Some(503) => "unavailable",
            Some(515) => "restart required",
            Some(_) => "unrecognized",
            None => "no reason",
        }
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "{} ({})", self.label(), code),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Connection state update emitted by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionUpdate {
    Connecting,
    Open,
    Closed(DisconnectReason),
}

/// A credential file changed on the platform side and must be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialUpdate {
    /// Store key, e.g. `creds.json`.
    pub key: String,
    pub data: Vec<u8>,
}

/// Options passed to [`PlatformConnector::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub session_id: SessionId,
    /// Persisted auth files for this identity, keyed by file name.
    pub auth: BTreeMap<String, Vec<u8>>,
    /// Browser identity presented to the platform (`[os, browser]`).
    pub browser: [String; 2],
    pub connect_timeout: Duration,
    pub keep_alive_interval: Duration,
}

impl ConnectOptions {
    pub fn new(session_id: SessionId, auth: BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            session_id,
            auth,
            browser: ["macOS".to_string(), "Safari".to_string()],
            connect_timeout: Duration::from_secs(60),
            keep_alive_interval: Duration::from_secs(30),
        }
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, keep_alive: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.keep_alive_interval = keep_alive;
        self
    }
}

/// A live connection to the platform.
#[async_trait]
pub trait PlatformSession: Send + Sync {
    /// Whether the auth state already completed device registration.
    fn is_registered(&self) -> bool;

    /// Whether the underlying connection is still usable.
    fn is_alive(&self) -> bool;

    /// The account's own identity, once known.
    fn user_id(&self) -> Option<String>;

    /// Ask the platform for a pairing code for `phone` (digits only).
    async fn request_pairing_code(
        &self,
        phone: &str,
        custom_code: Option<&str>,
    ) -> Result<String, PlatformError>;

    async fn send_message(&self, jid: &str, message: &OutgoingMessage) -> Result<(), PlatformError>;

    async fn accept_group_invite(&self, code: &str) -> Result<(), PlatformError>;

    async fn close(&self) -> Result<(), PlatformError>;
}

/// Everything a freshly connected session hands to the pipeline.
pub struct PlatformHandle {
    pub session: Arc<dyn PlatformSession>,
    pub connection: mpsc::UnboundedReceiver<ConnectionUpdate>,
    pub credentials: mpsc::UnboundedReceiver<CredentialUpdate>,
    pub messages: mpsc::UnboundedReceiver<IncomingMessage>,
}

impl std::fmt::Debug for PlatformHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformHandle")
            .field("registered", &self.session.is_registered())
            .field("alive", &self.session.is_alive())
            .finish_non_exhaustive()
    }
}

/// Opens platform sessions.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    async fn connect(&self, options: ConnectOptions) -> Result<PlatformHandle, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_logout_is_terminal() {
        assert!(DisconnectReason::new(401).is_terminal());
        for code in [403, 408, 428, 440, 500, 503, 515] {
            assert!(
                !DisconnectReason::new(code).is_terminal(),
                "{} should be retryable",
                code
            );
        }
        assert!(!DisconnectReason::unknown().is_terminal());
    }

    #[test]
    fn test_disconnect_reason_display() {
        assert_eq!(
            DisconnectReason::new(515).to_string(),
            "restart required (515)"
        );
        assert_eq!(DisconnectReason::new(999).to_string(), "unrecognized (999)");
        assert_eq!(DisconnectReason::unknown().to_string(), "no reason");
    }

    #[test]
    fn test_connect_options_defaults() {
        let options = ConnectOptions::new(SessionId::generate(), BTreeMap::new());
        assert_eq!(options.browser, ["macOS".to_string(), "Safari".to_string()]);
        assert_eq!(options.connect_timeout, Duration::from_secs(60));
        assert_eq!(options.keep_alive_interval, Duration::from_secs(30));
    }
}
