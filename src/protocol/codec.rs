//! Wire payload transcoding.
//!
//! The transport boundary hands characteristic values over as base64 text.
//! Inside the engine payloads are raw bytes; hex is used only for logs.

use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;

use crate::error::{Error, Result};

/// A characteristic value in its base64 wire encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct WirePayload(String);

impl WirePayload {
    /// Wrap text received from the transport without validating it.
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Encode raw bytes for the transport.
    pub fn from_bytes(raw: &[u8]) -> Self {
        Self(general_purpose::STANDARD.encode(raw))
    }

    /// The encoded text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the payload carries no data.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode to raw bytes.
    pub fn decode(&self) -> Result<Bytes> {
        general_purpose::STANDARD
            .decode(&self.0)
            .map(Bytes::from)
            .map_err(|e| Error::InvalidData {
                context: format!("Invalid base64 payload {:?}: {}", self.0, e),
            })
    }
}

impl std::fmt::Display for WirePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format raw bytes as lowercase hex for diagnostics.
pub fn to_hex(raw: &[u8]) -> String {
    hex::encode(raw)
}

/// Result of transcoding one status read into the command to write back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeFrame {
    /// Raw bytes of the status read.
    pub raw: Bytes,
    /// Payload to write to the command characteristic.
    pub response: WirePayload,
}

impl ExchangeFrame {
    /// Hex form of the raw bytes.
    pub fn hex(&self) -> String {
        to_hex(&self.raw)
    }
}

/// Decode a status read and re-encode it for the command characteristic.
///
/// The response carries exactly the bytes that were read.
pub fn transcode(read: &WirePayload) -> Result<ExchangeFrame> {
    if read.is_empty() {
        return Err(Error::EmptyPayload);
    }

    let raw = read.decode()?;
    if raw.is_empty() {
        return Err(Error::EmptyPayload);
    }

    let response = WirePayload::from_bytes(&raw);
    Ok(ExchangeFrame { raw, response })
}
