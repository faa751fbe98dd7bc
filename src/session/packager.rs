//! Packaging of credential material for transport as a chat message.
//!
//! ```text
//! bytes ──gzip──► compressed ──base64──► "Buddy~H4sIAAAA..."
//! ```
//!
//! [`unpack`] is the exact inverse and is what the restore command uses.

use std::io::{Read, Write};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::PackError;

/// Literal marker in front of every packaged payload.
pub const PAYLOAD_MARKER: &str = "Buddy";

/// Separator between the marker and the encoded data.
pub const PAYLOAD_SEPARATOR: char = '~';

/// A packaged, text-safe payload. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedPayload(String);

impl PackagedPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base64 part, without the marker.
    pub fn encoded(&self) -> &str {
        strip_marker(&self.0)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PackagedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compress and encode `data`.
pub fn package(data: &[u8]) -> Result<PackagedPayload, PackError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(PackError::Compress)?;
    let compressed = encoder.finish().map_err(PackError::Compress)?;

    Ok(PackagedPayload(format!(
        "{}{}{}",
        PAYLOAD_MARKER,
        PAYLOAD_SEPARATOR,
        STANDARD.encode(compressed)
    )))
}

/// Reverse [`package`]. The marker is optional so a bare base64 string
/// copied out of the message also restores.
pub fn unpack(text: &str) -> Result<Vec<u8>, PackError> {
    let encoded = strip_marker(text.trim());
    if encoded.is_empty() {
        return Err(PackError::Empty);
    }

    let compressed = STANDARD.decode(encoded)?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut data = Vec::new();
    decoder
        .read_to_end(&mut data)
        .map_err(PackError::Decompress)?;
    Ok(data)
}

fn strip_marker(text: &str) -> &str {
    text.strip_prefix(PAYLOAD_MARKER)
        .and_then(|rest| rest.strip_prefix(PAYLOAD_SEPARATOR))
        .unwrap_or(text)
}
