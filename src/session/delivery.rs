//! Delivery of the packaged session to the account's self-chat.
//!
//! Sends are retried with a flat delay: the attempt count and spacing are
//! fixed so that the total time a failing delivery holds a session is
//! predictable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::packager::PackagedPayload;
use crate::platform::{Button, InteractiveMessage, OutgoingMessage, PlatformSession};

/// Configuration for delivery retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total send attempts, the first one included.
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next one.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

/// Presentation of the delivered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTemplate {
    pub footer: String,
    pub copy_label: String,
    /// Project repository link button (label, url).
    pub repo_link: Option<(String, String)>,
    /// Community channel link button (label, url).
    pub channel_link: Option<(String, String)>,
}

impl Default for DeliveryTemplate {
    fn default() -> Self {
        Self {
            footer: "> *Created by the XTR Developers*".to_string(),
            copy_label: "Copy Session".to_string(),
            repo_link: Some((
                "Visit Bot Repo".to_string(),
                "https://github.com/carl24tech/Buddy-XTR".to_string(),
            )),
            channel_link: Some((
                "Join WaChannel".to_string(),
                "https://whatsapp.com/channel/00293hlgX5kg7G0nFggl0Y".to_string(),
            )),
        }
    }
}

impl DeliveryTemplate {
    /// Build the session message. The copy button carries the payload string
    /// unchanged.
    pub fn render(&self, payload: &PackagedPayload) -> OutgoingMessage {
        let mut buttons = vec![Button::copy(&self.copy_label, payload.as_str())];
        if let Some((label, url)) = &self.repo_link {
            buttons.push(Button::url(label, url));
        }
        if let Some((label, url)) = &self.channel_link {
            buttons.push(Button::url(label, url));
        }

        OutgoingMessage::Interactive(InteractiveMessage {
            title: String::new(),
            text: payload.as_str().to_string(),
            footer: self.footer.clone(),
            buttons,
        })
    }
}

/// Outcome of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Message delivered successfully.
    Delivered {
        /// Number of attempts made (1 = first try succeeded).
        attempts: u32,
    },
    /// All attempts exhausted, delivery failed.
    Failed {
        /// Total number of attempts made.
        attempts: u32,
        /// Error message from the last failed attempt.
        last_error: String,
    },
}

impl DeliveryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts } | DeliveryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Sends packaged sessions with bounded retry.
#[derive(Debug, Clone, Default)]
pub struct DeliveryAgent {
    retry: RetryConfig,
    template: DeliveryTemplate,
}

impl DeliveryAgent {
    pub fn new(retry: RetryConfig, template: DeliveryTemplate) -> Self {
        Self { retry, template }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Send `payload` to `target_jid`.
    ///
    /// A session that is no longer alive counts as a failed attempt without
    /// calling send.
    pub async fn deliver(
        &self,
        session: &dyn PlatformSession,
        target_jid: &str,
        payload: &PackagedPayload,
    ) -> DeliveryOutcome {
        let message = self.template.render(payload);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let result = if session.is_alive() {
                session
                    .send_message(target_jid, &message)
                    .await
                    .map_err(|e| e.to_string())
            } else {
                Err("session is closed".to_string())
            };

            match result {
                Ok(()) => {
                    tracing::info!(target = target_jid, attempts = attempt, "Session delivered");
                    return DeliveryOutcome::Delivered { attempts: attempt };
                }
                Err(e) => {
                    tracing::warn!(
                        target = target_jid,
                        attempt,
                        error = %e,
                        "Delivery attempt failed"
                    );
                    last_error = e;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            target = target_jid,
            attempts = max_attempts,
            last_error = %last_error,
            "Delivery failed after all attempts"
        );
        DeliveryOutcome::Failed {
            attempts: max_attempts,
            last_error,
        }
    }
}
