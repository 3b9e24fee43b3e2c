//! Error types for the session layer.

use cachegate_transport::ConnectionId;

/// Errors from the session registry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection already has a session. A connection authenticates
    /// at most once.
    #[error("connection {0} already has a session")]
    AlreadyAuthenticated(ConnectionId),
}

/// An unexpected failure inside an [`Authenticator`](crate::Authenticator).
///
/// This is not "the credential is wrong" (that's a
/// [`AuthResult::Failure`](crate::AuthResult::Failure)); it's "the
/// authenticator couldn't decide". The handshake turns it into
/// `AUTHENTICATOR_ERROR` so operators can tell a broken deployment from
/// a bad password.
#[derive(Debug, thiserror::Error)]
pub enum AuthenticatorError {
    /// The backing credential store could not be read.
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),

    /// Anything else that went wrong (hashing failure, bad stored data).
    #[error("authenticator failure: {0}")]
    Internal(String),
}
