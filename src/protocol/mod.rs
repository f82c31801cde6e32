//! Protocol module for the lock's payloads.
//!
//! This module contains the implementations for:
//! - Wire payload transcoding (base64 boundary encoding, hex diagnostics)
//! - Status code decoding

pub mod codec;
pub mod status;

pub use codec::{to_hex, transcode, ExchangeFrame, WirePayload};
pub use status::IndicatorColor;
