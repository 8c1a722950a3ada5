//! JSON frame codec for channels that can only carry strings.
//!
//! The in-process adapter moves typed messages directly; the thread
//! adapter serializes every message to a single-line JSON frame, which
//! also enforces that nothing non-serializable (callbacks, handles)
//! sneaks across the boundary.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to serialize message: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to parse frame: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Serialize one message into a wire frame.
pub fn encode<T: Serialize>(message: &T) -> Result<String, WireError> {
    serde_json::to_string(message).map_err(WireError::Encode)
}

/// Parse one wire frame back into a message.
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, WireError> {
    serde_json::from_str(frame).map_err(WireError::Decode)
}
