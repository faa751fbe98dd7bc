//! Optional group invite joined once per opened connection.

use std::sync::LazyLock;

use regex::Regex;

use crate::platform::PlatformSession;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"chat\.whatsapp\.com/([0-9A-Za-z]+)").expect("valid invite link regex")
});
static BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9A-Za-z]+)$").expect("valid invite code regex"));

/// A group invite code, extracted from either a full invite link or the bare
/// code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteCode(String);

impl InviteCode {
    /// Returns `None` when `raw` is neither an invite link nor a bare code.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        LINK_RE
            .captures(raw)
            .or_else(|| BARE_RE.captures(raw))
            .and_then(|caps| caps.get(1))
            .map(|m| Self(m.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InviteCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join the group. Failures are expected (expired link, already a member)
/// and only logged.
pub async fn join_group(session: &dyn PlatformSession, code: &InviteCode) {
    if !session.is_alive() {
        return;
    }
    match session.accept_group_invite(code.as_str()).await {
        Ok(()) => tracing::info!(invite = %code, "Joined group via invite"),
        Err(e) => tracing::warn!(
            invite = %code,
            error = %e,
            "Could not join group via invite (ignored)"
        ),
    }
}
