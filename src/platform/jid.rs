//! Platform addresses (JIDs).
//!
//! A user JID looks like `15551234567@s.whatsapp.net`. The identity reported
//! for a linked device carries a device suffix (`15551234567:12@s.whatsapp.net`)
//! which must be stripped to address the account's own chat.

/// Server suffix for group chats.
pub const GROUP_SERVER: &str = "g.us";

/// A parsed platform address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid {
    user: String,
    device: Option<u16>,
    server: String,
}

impl Jid {
    /// Parse `user[:device]@server`. Returns `None` for malformed input.
    pub fn parse(raw: &str) -> Option<Self> {
        let (left, server) = raw.trim().split_once('@')?;
        if server.is_empty() {
            return None;
        }
        let (user, device) = match left.split_once(':') {
            Some((user, device)) => (user, Some(device.parse().ok()?)),
            None => (left, None),
        };
        // Agent suffixes (`user_1`) are dropped along with the device.
        let user = user.split('_').next().unwrap_or(user);
        if user.is_empty() {
            return None;
        }
        Some(Self {
            user: user.to_string(),
            device,
            server: server.to_string(),
        })
    }

    /// Normalize a raw user id to `user@server`, the self-chat address.
    pub fn normalized_user(raw: &str) -> Option<String> {
        Self::parse(raw).map(|jid| jid.to_user().to_string())
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn device(&self) -> Option<u16> {
        self.device
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    /// The same address without a device component.
    pub fn to_user(&self) -> Jid {
        Jid {
            user: self.user.clone(),
            device: None,
            server: self.server.clone(),
        }
    }
}

impl std::fmt::Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.device {
            Some(device) => write!(f, "{}:{}@{}", self.user, device, self.server),
            None => write!(f, "{}@{}", self.user, self.server),
        }
    }
}
