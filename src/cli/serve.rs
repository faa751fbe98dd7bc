//! `serve`: run the HTTP pairing service.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use url::Url;

use crate::config::{Config, PipelineTimings, default_session_dir, parse_group_invite};
use crate::error::ConfigError;
use crate::pairing::PairingService;
use crate::platform::{BridgeConfig, BridgeConnector};
use crate::server::{HttpServer, router};
use crate::session::{ConnectionStateMachine, DeliveryTemplate};
use crate::store::FileCredentialStore;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Directory holding per-session credential files [default: ~/.pairlink/sessions]
    #[arg(long, env = "SESSION_DIR")]
    pub session_dir: Option<PathBuf>,

    /// WebSocket URL of the platform bridge
    #[arg(long, env = "PLATFORM_BRIDGE_URL", default_value = "ws://127.0.0.1:3001/")]
    pub bridge_url: String,

    /// Group to join on every linked session (invite code or link)
    #[arg(long, env = "GROUP_INVITE")]
    pub group_invite: Option<String>,

    /// Repository link shown under the delivered session
    #[arg(long, env = "REPO_URL")]
    pub repo_url: Option<String>,

    /// Channel link shown under the delivered session
    #[arg(long, env = "CHANNEL_URL")]
    pub channel_url: Option<String>,

    /// Footer of the delivered session message
    #[arg(long, env = "SESSION_FOOTER")]
    pub footer: Option<String>,

    /// Seconds a delivered session stays connected
    #[arg(long, env = "PAIR_GRACE_SECS", default_value_t = 600)]
    pub grace_secs: u64,

    /// Reconnects allowed per attempt (unbounded if unset)
    #[arg(long, env = "PAIR_MAX_RECONNECTS")]
    pub max_reconnects: Option<u32>,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            port: 8000,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            session_dir: None,
            bridge_url: "ws://127.0.0.1:3001/".to_string(),
            group_invite: None,
            repo_url: None,
            channel_url: None,
            footer: None,
            grace_secs: 600,
            max_reconnects: None,
        }
    }
}

impl ServeArgs {
    /// Resolve the arguments into a validated [`Config`].
    pub fn into_config(self, log_json: bool) -> Result<Config, ConfigError> {
        let session_dir = match self.session_dir {
            Some(dir) => dir,
            None => default_session_dir()?,
        };

        let url = Url::parse(&self.bridge_url).map_err(|e| ConfigError::InvalidValue {
            key: "PLATFORM_BRIDGE_URL".to_string(),
            message: e.to_string(),
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue {
                key: "PLATFORM_BRIDGE_URL".to_string(),
                message: format!("expected a ws:// or wss:// URL, got {}", url.scheme()),
            });
        }

        let mut template = DeliveryTemplate::default();
        if let Some(footer) = self.footer {
            template.footer = footer;
        }
        if let Some(repo) = self.repo_url {
            template.repo_link = link("REPO_URL", &repo, template.repo_link.take())?;
        }
        if let Some(channel) = self.channel_url {
            template.channel_link = link("CHANNEL_URL", &channel, template.channel_link.take())?;
        }

        let timings = PipelineTimings {
            grace_period: Duration::from_secs(self.grace_secs),
            ..PipelineTimings::default()
        };

        Ok(Config {
            bind: SocketAddr::new(self.bind, self.port),
            session_dir,
            bridge: BridgeConfig::new(url),
            group_invite: parse_group_invite(self.group_invite.as_deref()),
            template,
            timings,
            max_reconnects: self.max_reconnects,
            log_json,
        })
    }
}

/// Replace the URL of a link button, keeping its label. An empty value
/// removes the button.
fn link(
    key: &str,
    raw: &str,
    current: Option<(String, String)>,
) -> Result<Option<(String, String)>, ConfigError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    let label = current.map(|(label, _)| label).unwrap_or_else(|| "Open".to_string());
    Ok(Some((label, raw.to_string())))
}

/// Run the service until Ctrl-C.
pub async fn run_serve(config: Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.session_dir).await?;
    let store = Arc::new(FileCredentialStore::new(&config.session_dir));
    let connector = Arc::new(BridgeConnector::new(config.bridge.clone()));

    let machine = ConnectionStateMachine::new(connector, store.clone(), config.timings.clone())
        .with_template(config.template.clone())
        .with_group_invite(config.group_invite.clone())
        .with_max_reconnects(config.max_reconnects);
    let service = PairingService::new(Arc::new(machine), store);

    tracing::info!(
        session_dir = %config.session_dir.display(),
        bridge = %config.bridge.url,
        grace_secs = config.timings.grace_period.as_secs(),
        max_reconnects = ?config.max_reconnects,
        "Starting pairing service"
    );

    let mut server = HttpServer::new(config.bind, router(service));
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    server.shutdown().await;
    Ok(())
}
