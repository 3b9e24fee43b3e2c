//! Error types for the protocol layer.
//!
//! Each crate in cachegate defines its own error enum. A `ProtocolError`
//! means the bytes were wrong, never that the network or the
//! authenticator was.

use crate::ReasonCode;

/// Errors that can occur while encoding or decoding handshake messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Covers malformed JSON, missing fields, and carriers that break a
    /// structural rule (duplicate names, no fields, ...).
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The frame was larger than the handshake limit. Checked before
    /// any parsing happens.
    #[error("message of {size} bytes exceeds limit of {max} bytes")]
    TooLarge { size: usize, max: usize },

    /// The client speaks a different protocol version.
    #[error("unsupported protocol version {got}, expected {expected}")]
    VersionMismatch { expected: u32, got: u32 },

    /// The message is invalid at the protocol level.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// The reason code a server reports when a handshake request fails
    /// to decode with this error.
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            ProtocolError::TooLarge { .. } => ReasonCode::OversizedMessage,
            _ => ReasonCode::MalformedCredential,
        }
    }
}
