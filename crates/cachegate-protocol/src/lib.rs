//! Wire protocol for the cachegate authentication handshake.
//!
//! This crate defines what a client says to prove who it is, and what
//! the server says back:
//!
//! - **Credential** ([`CredentialCarrier`]): the ordered, immutable
//!   bundle of identity fields a client presents.
//! - **Messages** ([`HandshakeRequest`], [`HandshakeAck`], [`ReasonCode`]):
//!   the two messages of a handshake and the closed set of rejection
//!   reasons.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become
//!   bytes, plus [`decode_handshake_request`] which bounds the size of
//!   untrusted input before parsing it.
//!
//! # Architecture
//!
//! ```text
//! Transport (frames) → Protocol (HandshakeRequest) → Session (principal)
//! ```

mod codec;
mod credential;
mod error;
mod types;

pub use codec::{Codec, decode_handshake_request};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use credential::{
    CarrierError, CredentialBuilder, CredentialCarrier, CredentialField, FieldValue,
    MAX_CREDENTIAL_FIELDS, MAX_FIELD_NAME_BYTES, PRINCIPAL_FIELD, SECRET_FIELD,
};
pub use error::ProtocolError;
pub use types::{
    Attributes, DEFAULT_MAX_CREDENTIAL_BYTES, HandshakeAck, HandshakeRequest,
    PROTOCOL_VERSION, Principal, ReasonCode,
};
