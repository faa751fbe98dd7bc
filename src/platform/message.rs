//! Outgoing and incoming chat messages.

use serde::{Deserialize, Serialize};

/// A message received on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    /// Chat the message arrived in.
    pub from: String,
    /// Sent by the linked account itself.
    #[serde(default)]
    pub from_me: bool,
    /// Text content, already extracted from whatever message type carried it
    /// (conversation, caption, button reply, ...).
    #[serde(default)]
    pub text: Option<String>,
}

/// A message to send.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutgoingMessage {
    /// Plain text, optionally quoting a received message.
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        quoted: Option<String>,
    },
    /// Structured message with action buttons.
    Interactive(InteractiveMessage),
}

impl OutgoingMessage {
    pub fn reply(text: impl Into<String>, quoted: &IncomingMessage) -> Self {
        OutgoingMessage::Text {
            text: text.into(),
            quoted: Some(quoted.id.clone()),
        }
    }

    /// Body text of the message.
    pub fn text(&self) -> &str {
        match self {
            OutgoingMessage::Text { text, .. } => text,
            OutgoingMessage::Interactive(message) => &message.text,
        }
    }
}

/// A structured message: body, footer and native-flow buttons.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractiveMessage {
    pub title: String,
    pub text: String,
    pub footer: String,
    pub buttons: Vec<Button>,
}

/// A native-flow button. The platform's schema carries its parameters as a
/// JSON string (`buttonParamsJson`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    pub name: String,
    #[serde(rename = "buttonParamsJson")]
    pub params_json: String,
}

#[derive(Serialize)]
struct CopyParams<'a> {
    display_text: &'a str,
    copy_code: &'a str,
}

#[derive(Serialize)]
struct UrlParams<'a> {
    display_text: &'a str,
    url: &'a str,
}

impl Button {
    /// Button that copies `code` to the clipboard verbatim.
    pub fn copy(display_text: &str, code: &str) -> Self {
        Self {
            name: "cta_copy".to_string(),
            params_json: encode_params(&CopyParams {
                display_text,
                copy_code: code,
            }),
        }
    }

    /// Button that opens `url`.
    pub fn url(display_text: &str, url: &str) -> Self {
        Self {
            name: "cta_url".to_string(),
            params_json: encode_params(&UrlParams { display_text, url }),
        }
    }

    /// The `copy_code` carried by a copy button.
    pub fn copy_code(&self) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.params_json).ok()?;
        value.get("copy_code")?.as_str().map(str::to_string)
    }
}

fn encode_params<T: Serialize>(params: &T) -> String {
    // Structs of &str always serialize.
    serde_json::to_string(params).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_button_carries_exact_code() {
        let code = "Buddy~H4sIAAAAAAAA/+3BAQ0AAADCoPdPbQ8HFAAAAAAAAAAAAAAA/wE=";
        let button = Button::copy("Copy Session", code);
        assert_eq!(button.name, "cta_copy");
        assert_eq!(button.copy_code().as_deref(), Some(code));
    }

    #[test]
    fn test_url_button_params() {
        let button = Button::url("Visit", "https://example.com/repo");
        let params: serde_json::Value = serde_json::from_str(&button.params_json).unwrap();
        assert_eq!(params["display_text"], "Visit");
        assert_eq!(params["url"], "https://example.com/repo");
        assert!(button.copy_code().is_none());
    }

    #[test]
    fn test_outgoing_serialization_shape() {
        let message = OutgoingMessage::Interactive(InteractiveMessage {
            title: String::new(),
            text: "body".to_string(),
            footer: "foot".to_string(),
            buttons: vec![Button::url("a", "https://a.example")],
        });
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["kind"], "interactive");
        assert_eq!(json["buttons"][0]["name"], "cta_url");
        assert!(json["buttons"][0]["buttonParamsJson"].is_string());
    }

    #[test]
    fn test_reply_quotes_original() {
        let incoming = IncomingMessage {
            id: "MSG1".to_string(),
            from: "1555@s.whatsapp.net".to_string(),
            from_me: false,
            text: Some("ping".to_string()),
        };
        let reply = OutgoingMessage::reply("pong", &incoming);
        assert_eq!(
            reply,
            OutgoingMessage::Text {
                text: "pong".to_string(),
                quoted: Some("MSG1".to_string())
            }
        );
        assert_eq!(reply.text(), "pong");
    }
}
