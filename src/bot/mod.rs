//! Basic chat bot started on every opened session.
//!
//! It answers a handful of commands in direct chats so the user can check
//! that the freshly linked session works. Own messages and group chats are
//! ignored.

pub mod commands;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use commands::BotCommand;

use crate::platform::{IncomingMessage, Jid, OutgoingMessage, PlatformSession};

/// Reply for `message`, or `None` if the bot stays silent.
pub fn reply_for(message: &IncomingMessage) -> Option<String> {
    if message.from_me {
        return None;
    }
    let from = Jid::parse(&message.from)?;
    if from.is_group() {
        return None;
    }
    let command = BotCommand::parse(message.text.as_deref()?)?;
    Some(command.reply(&message.from, chrono::Utc::now()))
}

/// Answer incoming messages until the channel closes or the task is aborted.
pub fn spawn_responder(
    session: Arc<dyn PlatformSession>,
    mut messages: mpsc::UnboundedReceiver<IncomingMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = messages.recv().await {
            let Some(text) = reply_for(&message) else {
                continue;
            };
            if !session.is_alive() {
                break;
            }
            let reply = OutgoingMessage::reply(text, &message);
            if let Err(e) = session.send_message(&message.from, &reply).await {
                tracing::debug!(to = %message.from, error = %e, "Bot reply failed");
            }
        }
        tracing::debug!("Bot responder stopped");
    })
}
