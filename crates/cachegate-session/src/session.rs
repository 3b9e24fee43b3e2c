//! Session types: the server's record of an authenticated connection.
//!
//! A session tracks:
//! - WHICH connection it belongs to (`ConnectionId`)
//! - WHO is on the other end (`Principal` + attributes)
//! - WHEN it was established
//!
//! It never holds secret material: the credential that produced it is
//! dropped as soon as validation finishes.

use std::fmt;
use std::time::SystemTime;

use cachegate_protocol::{Attributes, Principal};
use cachegate_transport::ConnectionId;
use rand::Rng;

/// A random, unguessable session identifier (32 hex characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh id with 128 bits of entropy.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One authenticated connection.
///
/// Sessions are owned by the [`SessionRegistry`](crate::SessionRegistry);
/// everything else works with clones or borrows it inside
/// [`with_session`](crate::SessionRegistry::with_session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Random id, handy for correlating log lines.
    pub session_id: SessionId,

    /// The validated identity.
    pub principal: Principal,

    /// Attributes the authenticator attached (roles, tenant, ...).
    pub attributes: Attributes,

    /// The connection this session authorizes.
    pub connection: ConnectionId,

    /// When the handshake succeeded.
    pub created_at: SystemTime,
}

impl Session {
    /// Creates a session for `connection` with a fresh id.
    pub fn new(connection: ConnectionId, principal: Principal, attributes: Attributes) -> Self {
        Self {
            session_id: SessionId::generate(),
            principal,
            attributes,
            connection,
            created_at: SystemTime::now(),
        }
    }
}
