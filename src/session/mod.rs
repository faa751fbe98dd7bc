//! Everything that happens to a platform session after it is created:
//! reconnection, credential capture, packaging, delivery and teardown.

pub mod cleaner;
pub mod connection;
pub mod delivery;
pub mod invite;
pub mod lifecycle;
pub mod packager;
pub mod poller;

pub use cleaner::SessionCleaner;
pub use connection::ConnectionStateMachine;
pub use delivery::{DeliveryAgent, DeliveryOutcome, DeliveryTemplate, RetryConfig};
pub use invite::InviteCode;
pub use lifecycle::{LifecycleManager, TeardownHandle};
pub use packager::{PAYLOAD_MARKER, PackagedPayload, package, unpack};
pub use poller::{CredentialPoller, PollConfig};
