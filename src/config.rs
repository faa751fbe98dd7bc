//! Service configuration.
//!
//! Values come from CLI flags with environment fallbacks (see
//! [`crate::cli::ServeArgs`]); a `.env` file is loaded before parsing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::platform::BridgeConfig;
use crate::session::{DeliveryTemplate, InviteCode, PollConfig, RetryConfig};

/// Fixed delays and bounds of the pairing pipeline.
#[derive(Debug, Clone)]
pub struct PipelineTimings {
    /// Wait after opening an unregistered session before requesting a code.
    pub pairing_settle: Duration,
    /// Flat wait before reconnecting after a retryable close.
    pub reconnect_backoff: Duration,
    /// Wait after the connection opens before polling for credentials.
    pub open_settle: Duration,
    pub poll: PollConfig,
    /// Wait between packaging and the first send.
    pub pre_send: Duration,
    pub delivery: RetryConfig,
    /// Wait after a successful send before the teardown is scheduled.
    pub post_delivery_settle: Duration,
    /// How long a delivered session stays connected.
    pub grace_period: Duration,
    pub connect_timeout: Duration,
    pub keep_alive_interval: Duration,
}

impl Default for PipelineTimings {
    fn default() -> Self {
        Self {
            pairing_settle: Duration::from_millis(1500),
            reconnect_backoff: Duration::from_secs(5),
            open_settle: Duration::from_secs(50),
            poll: PollConfig::default(),
            pre_send: Duration::from_secs(5),
            delivery: RetryConfig::default(),
            post_delivery_settle: Duration::from_secs(3),
            grace_period: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(60),
            keep_alive_interval: Duration::from_secs(30),
        }
    }
}

/// Complete runtime configuration of the `serve` command.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    /// Root of the per-identity credential directories.
    pub session_dir: PathBuf,
    pub bridge: BridgeConfig,
    pub group_invite: Option<InviteCode>,
    pub template: DeliveryTemplate,
    pub timings: PipelineTimings,
    /// Reconnects allowed per attempt. `None` means unbounded.
    pub max_reconnects: Option<u32>,
    pub log_json: bool,
}

/// `~/.pairlink/sessions`.
pub fn default_session_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".pairlink").join("sessions"))
        .ok_or_else(|| ConfigError::NoHomeDir {
            key: "SESSION_DIR".to_string(),
        })
}

/// Parse the group invite setting. An unparseable value is logged and
/// ignored, matching how a failed join is treated.
pub fn parse_group_invite(raw: Option<&str>) -> Option<InviteCode> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    let code = InviteCode::parse(raw);
    if code.is_none() {
        tracing::warn!("GROUP_INVITE is set but could not be parsed as an invite code");
    }
    code
}
