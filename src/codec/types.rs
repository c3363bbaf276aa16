//! Codec error definitions.

use thiserror::Error;

/// Errors raised while decoding telemetry payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Hex payload is not block-aligned or contains non-hex characters.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// LoRa frame has the wrong length or unexpected section markers.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
