//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! The handshake layer doesn't care HOW messages become bytes; it just
//! needs something that implements [`Codec`]. The server's coordinator is
//! generic over it, so a binary format can replace [`JsonCodec`] without
//! touching the handshake logic.
//!
//! [`decode_handshake_request`] is the one place a request frame becomes
//! a [`HandshakeRequest`]. It runs the checks in a fixed order: size
//! first (a huge frame is never handed to the parser), then structure,
//! then protocol version.

use serde::{Serialize, de::DeserializeOwned};

use crate::{HandshakeRequest, PROTOCOL_VERSION, ProtocolError};

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds explained
///
/// - `Send + Sync`: one codec instance is shared by every connection
///   task, and Tokio may poll those tasks on any worker thread.
/// - `'static`: the codec owns everything it needs, so it can live
///   inside the `Arc`'d server state for the life of the process.
///
/// ## Generic methods
///
/// `encode<T: Serialize>` and `decode<T: DeserializeOwned>` work for any
/// serde type. `DeserializeOwned` (rather than `Deserialize<'de>`) means
/// the decoded value owns its data and never borrows from the frame.
/// That matters here: the credential inside a request outlives the
/// receive buffer, and its secret fields are wiped on their own drop.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// Decodes one handshake request frame.
///
/// The size limit is enforced before the codec sees a single byte, then
/// the protocol version is checked.
///
/// # Errors
/// - [`ProtocolError::TooLarge`] if `frame` is longer than `max_bytes`
/// - a decode error if the frame isn't a well-formed request
/// - [`ProtocolError::VersionMismatch`] for any other protocol version
pub fn decode_handshake_request(
    codec: &impl Codec,
    frame: &[u8],
    max_bytes: usize,
) -> Result<HandshakeRequest, ProtocolError> {
    if frame.len() > max_bytes {
        return Err(ProtocolError::TooLarge {
            size: frame.len(),
            max: max_bytes,
        });
    }

    let request: HandshakeRequest = codec.decode(frame)?;
    if request.version != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch {
            expected: PROTOCOL_VERSION,
            got: request.version,
        });
    }
    Ok(request)
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Human-readable, so handshakes can be inspected in a packet capture.
/// Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use cachegate_protocol::{Codec, CredentialCarrier, HandshakeRequest, JsonCodec};
///
/// let codec = JsonCodec;
/// let request = HandshakeRequest::new(CredentialCarrier::password("super-user", "1234567"));
///
/// let bytes = codec.encode(&request).unwrap();
/// let decoded: HandshakeRequest = codec.decode(&bytes).unwrap();
/// assert_eq!(request, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
