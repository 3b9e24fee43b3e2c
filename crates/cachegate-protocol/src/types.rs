//! Handshake wire types.
//!
//! Exactly two messages travel during a handshake:
//!
//! ```text
//! Client                                      Server
//!   |  -- HandshakeRequest { credential } -->   |
//!   |  <-- HandshakeAck::AuthOk | AuthFailed -- |
//! ```
//!
//! Anything after that belongs to the cache protocol, which this crate
//! does not describe.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CredentialCarrier;

/// The current handshake protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default bound on the size of an encoded handshake request (8 KiB).
pub const DEFAULT_MAX_CREDENTIAL_BYTES: usize = 8 * 1024;

/// Attributes attached to an authenticated principal (roles, region, ...).
///
/// A `BTreeMap` keeps the wire encoding deterministic.
pub type Attributes = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// A validated identity name.
///
/// Serialized as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Wraps a principal name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The principal name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Principal {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for Principal {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Principal {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ---------------------------------------------------------------------------
// ReasonCode
// ---------------------------------------------------------------------------

/// Why a handshake was rejected. This is a closed set: every failure on
/// the server side is folded into one of these before it reaches the
/// wire.
///
/// Serialized as `SCREAMING_SNAKE_CASE`, e.g. `"INVALID_CREDENTIALS"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Unknown principal or wrong secret. Deliberately not split further.
    InvalidCredentials,
    /// The credential message was structurally invalid.
    MalformedCredential,
    /// The connection already has a session.
    DuplicateHandshake,
    /// The authenticator itself failed (bug, store outage, panic).
    AuthenticatorError,
    /// The requested or configured scheme is not available.
    UnsupportedScheme,
    /// The credential message exceeded the size limit.
    OversizedMessage,
}

impl ReasonCode {
    /// All reason codes, in declaration order.
    pub const ALL: [ReasonCode; 6] = [
        ReasonCode::InvalidCredentials,
        ReasonCode::MalformedCredential,
        ReasonCode::DuplicateHandshake,
        ReasonCode::AuthenticatorError,
        ReasonCode::UnsupportedScheme,
        ReasonCode::OversizedMessage,
    ];

    /// The wire name of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ReasonCode::MalformedCredential => "MALFORMED_CREDENTIAL",
            ReasonCode::DuplicateHandshake => "DUPLICATE_HANDSHAKE",
            ReasonCode::AuthenticatorError => "AUTHENTICATOR_ERROR",
            ReasonCode::UnsupportedScheme => "UNSUPPORTED_SCHEME",
            ReasonCode::OversizedMessage => "OVERSIZED_MESSAGE",
        }
    }

    /// `true` when the client's credential is at fault (bad secret,
    /// garbage payload); `false` when the server or its configuration is.
    pub fn is_credential_failure(self) -> bool {
        matches!(
            self,
            ReasonCode::InvalidCredentials
                | ReasonCode::MalformedCredential
                | ReasonCode::OversizedMessage
                | ReasonCode::DuplicateHandshake
        )
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// HandshakeRequest
// ---------------------------------------------------------------------------

/// Client → Server: the one credential message of a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandshakeRequest {
    /// Must equal [`PROTOCOL_VERSION`].
    pub version: u32,

    /// Optional scheme the client expects the server to use.
    ///
    /// The server always authenticates with its configured scheme. A
    /// hint that disagrees with it is rejected rather than honoured, so
    /// a client can't talk the server down to a weaker scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    /// The credential itself.
    pub credential: CredentialCarrier,
}

impl HandshakeRequest {
    /// A request for the current protocol version with no scheme hint.
    pub fn new(credential: CredentialCarrier) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            scheme: None,
            credential,
        }
    }

    /// Adds a scheme hint.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }
}

// ---------------------------------------------------------------------------
// HandshakeAck
// ---------------------------------------------------------------------------

/// Server → Client: the one acknowledgment of a handshake.
///
/// Internally tagged on `status`:
///
/// ```json
/// {"status": "auth_ok", "principal": "super-user", "attributes": {}}
/// {"status": "auth_failed", "reason": "INVALID_CREDENTIALS"}
/// ```
///
/// A failure carries only the reason code. Diagnostic text stays in the
/// server's logs, where it can't help anyone guess credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandshakeAck {
    /// The credential was accepted; the connection is now a session.
    AuthOk {
        principal: Principal,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        attributes: Attributes,
    },

    /// The credential was rejected.
    AuthFailed { reason: ReasonCode },
}
