//! Pairing requests: address validation, the per-request attempt context,
//! and the pairing-code handshake with the platform.

pub mod address;
pub mod attempt;
pub mod codes;
pub mod coordinator;
pub mod service;

pub use address::PhoneNumber;
pub use attempt::{PairingAttempt, PairingResponse, PlatformSessionState};
pub use coordinator::PairingCoordinator;
pub use service::PairingService;
