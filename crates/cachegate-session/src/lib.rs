//! Authentication and session tracking for cachegate.
//!
//! This crate answers two questions for the server:
//!
//! 1. **Is this credential valid?** The [`Authenticator`] trait, selected
//!    by scheme name from an [`AuthenticatorRegistry`]. The bundled
//!    [`PasswordAuthenticator`] checks principal + secret against a
//!    [`CredentialStore`].
//! 2. **Which connections are authenticated, as whom?** The
//!    [`SessionRegistry`], with a [`SessionGuard`] that revokes a
//!    connection's session when its task ends.
//!
//! # How it fits in the stack
//!
//! ```text
//! Handshake coordinator (above)  ← calls validate(), then register()
//!     ↕
//! Session Layer (this crate)     ← authenticators + live sessions
//!     ↕
//! Protocol Layer (below)         ← CredentialCarrier, Principal, ReasonCode
//! ```

mod auth;
mod error;
mod password;
mod registry;
mod session;

pub use auth::{AuthResult, Authenticator, AuthenticatorRegistry};
pub use error::{AuthenticatorError, SessionError};
pub use password::{
    CredentialStore, InMemoryCredentialStore, PasswordAuthenticator, StoredCredential,
    StoredSecret,
};
pub use registry::{SessionGuard, SessionRegistry};
pub use session::{Session, SessionId};
