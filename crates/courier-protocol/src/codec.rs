//! Codec for encoding and decoding Courier events.
//!
//! Events travel as JSON text frames. The codec enforces a size limit on
//! inbound frames and classifies malformed input.

use thiserror::Error;

use crate::events::{ClientEvent, ServerEvent};

/// Maximum inbound event size (64 KiB).
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a server event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_server(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

/// Decode a client event from a JSON text frame.
///
/// # Errors
///
/// Returns an error if the frame is too large, malformed, or names an
/// unknown event.
pub fn decode_client(text: &str) -> Result<ClientEvent, ProtocolError> {
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }

    Ok(serde_json::from_str(text)?)
}
