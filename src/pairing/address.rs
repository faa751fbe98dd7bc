//! Target address normalization.

use crate::error::PairingError;

/// Longest number the platform accepts (E.164 allows 15 digits; leave room
/// for numbers pasted with an extra leading zero).
const MAX_DIGITS: usize = 20;

/// A phone number reduced to its digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Strip everything but ASCII digits. Fails if nothing usable remains.
    pub fn parse(raw: &str) -> Result<Self, PairingError> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() || digits.len() > MAX_DIGITS {
            return Err(PairingError::InvalidAddress {
                input: raw.to_string(),
            });
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
