//! JSON text-frame codec for the event catalog.
//!
//! Decoding is strict: unknown event names, unknown payload fields and
//! payloads that break a model invariant are all errors.

use crate::event::{ClientEvent, ServerEvent};
use crate::validate::{Validate, ValidationError};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The frame decoded but its payload is not acceptable.
    #[error("invalid payload: {0}")]
    Invalid(#[from] ValidationError),
}

/// Encodes a client event as a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode_client(event: &ClientEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Decodes and validates a client event.
///
/// # Errors
///
/// Returns `CodecError::Serialization` for frames of an unknown shape and
/// `CodecError::Invalid` for payloads that break an invariant.
pub fn decode_client(frame: &str) -> Result<ClientEvent, CodecError> {
    let event: ClientEvent = serde_json::from_str(frame)?;
    event.validate()?;
    Ok(event)
}

/// Encodes a server event as a JSON text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode_server(event: &ServerEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(event)?)
}

/// Decodes a server event.
///
/// # Errors
///
/// Returns `CodecError::Serialization` for frames of an unknown shape.
pub fn decode_server(frame: &str) -> Result<ServerEvent, CodecError> {
    Ok(serde_json::from_str(frame)?)
}
