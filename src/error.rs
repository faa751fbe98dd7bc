//! Error types for pairlink.

use std::time::Duration;

use crate::platform::DisconnectReason;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Packaging error: {0}")]
    Pack(#[from] PackError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Could not determine a home directory for {key}; set it explicitly")]
    NoHomeDir { key: String },
}

/// Errors surfaced to the caller of a pairing request.
///
/// Only [`PairingError::public_message`] ever reaches the HTTP response body.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PairingError {
    #[error("Invalid address: {input:?}")]
    InvalidAddress { input: String },

    #[error("Platform rejected the pairing request: {reason}")]
    PairingRequestFailed { reason: String },

    #[error("Service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("Pairing attempt ended without a response")]
    Aborted,
}

impl PairingError {
    /// Generic message suitable for the HTTP caller.
    pub fn public_message(&self) -> &'static str {
        match self {
            PairingError::InvalidAddress { .. } => "Invalid phone number",
            PairingError::PairingRequestFailed { .. } | PairingError::ServiceUnavailable { .. } => {
                "Service is Currently Unavailable"
            }
            PairingError::Aborted => "Service Error",
        }
    }
}

/// Connection lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Connection closed ({reason}), reconnecting")]
    Retryable { reason: DisconnectReason },

    #[error("Connection closed terminally ({reason})")]
    Terminal { reason: DisconnectReason },

    #[error("Gave up after {attempts} reconnects")]
    ReconnectLimit { attempts: u32 },
}

/// Credential capture errors.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credentials not available after {attempts} polls")]
    Timeout { attempts: u32 },

    #[error("Session closed before credentials were captured")]
    SessionClosed,
}

/// Session delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    Failed { attempts: u32, last_error: String },

    #[error("Session closed before delivery")]
    SessionClosed,
}

/// Payload packaging errors.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("Compression failed: {0}")]
    Compress(std::io::Error),

    #[error("Decompression failed: {0}")]
    Decompress(std::io::Error),

    #[error("Payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Payload is empty")]
    Empty,
}

/// Credential store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid store key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a platform session or connector.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("Platform rejected {op}: {reason}")]
    Rejected { op: String, reason: String },

    #[error("Session is closed")]
    Closed,

    #[error("Platform {op} timed out after {timeout:?}")]
    Timeout { op: String, timeout: Duration },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Server error: {0}")]
    Serve(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
