//! Command parsing for the basic chat bot.
//!
//! Commands may be prefixed with `!`, `.` or `/`. A few of them also answer
//! when sent as a bare word (`ping`, `alive`, `help`), and greetings get a
//! short reply.

use chrono::{DateTime, SecondsFormat, Utc};

/// Characters that mark a message as a command.
pub const COMMAND_PREFIXES: [char; 3] = ['!', '.', '/'];

/// Result of parsing one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Ping,
    Alive,
    Help,
    Id,
    Time,
    Greeting,
}

impl BotCommand {
    /// Parse trimmed message text. Returns `None` for anything the bot does
    /// not answer.
    pub fn parse(text: &str) -> Option<Self> {
        let lower = text.trim().to_lowercase();
        if lower.is_empty() {
            return None;
        }

        let cmd = match lower.strip_prefix(COMMAND_PREFIXES) {
            Some(rest) => rest.split_whitespace().next().unwrap_or(""),
            None => "",
        };

        match (cmd, lower.as_str()) {
            ("ping", _) | (_, "ping") => Some(BotCommand::Ping),
            ("alive" | "status", _) | (_, "alive") => Some(BotCommand::Alive),
            ("help" | "menu", _) | (_, "help") => Some(BotCommand::Help),
            ("id", _) => Some(BotCommand::Id),
            ("time", _) => Some(BotCommand::Time),
            (_, "hi" | "hello") => Some(BotCommand::Greeting),
            _ => None,
        }
    }

    /// Reply text for a command sent from `from` at `now`.
    pub fn reply(&self, from: &str, now: DateTime<Utc>) -> String {
        match self {
            BotCommand::Ping => "pong ✅".to_string(),
            BotCommand::Alive => "I am online ✅\nBasic bot mode is active.".to_string(),
            BotCommand::Help => HELP_TEXT.to_string(),
            BotCommand::Id => format!("Your JID: {}", from),
            BotCommand::Time => format!(
                "Server time: {}",
                now.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            BotCommand::Greeting => "Hey 👋".to_string(),
        }
    }
}

const HELP_TEXT: &str = "*Buddy Session Bot (Basic Commands)*

• .ping  – test response
• .alive – bot status
• .id    – show your JID
• .time  – server time
• .help  – this menu

> Powered by XTR Developers";
