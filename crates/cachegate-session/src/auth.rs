//! The pluggable authentication capability.
//!
//! cachegate doesn't hard-wire a credential scheme. It defines the
//! [`Authenticator`] trait, a single async `validate` method that looks
//! at a [`CredentialCarrier`] and returns an [`AuthResult`], and lets the
//! server pick an implementation by scheme name from an
//! [`AuthenticatorRegistry`].
//!
//! This keeps the transport and handshake layers ignorant of how a
//! credential is checked:
//! - [`PasswordAuthenticator`](crate::PasswordAuthenticator) for
//!   principal + secret against a credential store
//! - a token or certificate scheme in another deployment
//! - a mock authenticator in tests

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cachegate_protocol::{Attributes, CredentialCarrier, Principal, ReasonCode};

use crate::AuthenticatorError;

// ---------------------------------------------------------------------------
// AuthResult
// ---------------------------------------------------------------------------

/// The verdict of one validation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// The credential is valid.
    Success {
        principal: Principal,
        attributes: Attributes,
    },

    /// The credential was rejected.
    ///
    /// `message` is for operators. It is logged on the server and never
    /// sent to the client.
    Failure { reason: ReasonCode, message: String },
}

impl AuthResult {
    /// A success with the given principal and attributes.
    pub fn success(principal: impl Into<Principal>, attributes: Attributes) -> Self {
        AuthResult::Success {
            principal: principal.into(),
            attributes,
        }
    }

    /// A failure with the given reason and operator message.
    pub fn failure(reason: ReasonCode, message: impl Into<String>) -> Self {
        AuthResult::Failure {
            reason,
            message: message.into(),
        }
    }

    /// `true` for [`AuthResult::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, AuthResult::Success { .. })
    }
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Validates a client's credential.
///
/// # Contract
///
/// - Called at most once per handshake. The server never retries.
/// - May be called concurrently from many connection tasks, hence
///   `Send + Sync`. Shared state must be read-mostly.
/// - May block on a backing store, but should push blocking work onto
///   `tokio::task::spawn_blocking` so other connections keep moving.
/// - Must not cache negative results keyed by secret material.
///   Caching positive principal metadata is fine.
/// - Returning `Err` (or panicking) means "could not decide"; the
///   handshake rejects the connection with `AUTHENTICATOR_ERROR`.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use cachegate_protocol::{Attributes, CredentialCarrier, ReasonCode};
/// use cachegate_session::{AuthResult, Authenticator, AuthenticatorError};
///
/// /// Accepts a fixed API key in a secret `token` field.
/// struct ApiKeyAuthenticator {
///     key: String,
/// }
///
/// #[async_trait]
/// impl Authenticator for ApiKeyAuthenticator {
///     async fn validate(
///         &self,
///         carrier: &CredentialCarrier,
///     ) -> Result<AuthResult, AuthenticatorError> {
///         match carrier.text("token") {
///             Some(token) if token == self.key => {
///                 Ok(AuthResult::success("api-client", Attributes::new()))
///             }
///             Some(_) => Ok(AuthResult::failure(
///                 ReasonCode::InvalidCredentials,
///                 "bad api key",
///             )),
///             None => Ok(AuthResult::failure(
///                 ReasonCode::MalformedCredential,
///                 "missing token field",
///             )),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the carrier and returns the verdict.
    ///
    /// # Errors
    /// Returns [`AuthenticatorError`] when the authenticator cannot reach
    /// a verdict at all (store outage, corrupt stored data).
    async fn validate(
        &self,
        carrier: &CredentialCarrier,
    ) -> Result<AuthResult, AuthenticatorError>;
}

// ---------------------------------------------------------------------------
// AuthenticatorRegistry
// ---------------------------------------------------------------------------

/// Maps scheme names to authenticator instances.
///
/// Filled once at startup, then shared read-only (behind an `Arc`) by
/// every connection task.
#[derive(Default, Clone)]
pub struct AuthenticatorRegistry {
    schemes: HashMap<String, Arc<dyn Authenticator>>,
}

impl AuthenticatorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `authenticator` under `scheme`, returning any
    /// authenticator it replaced.
    pub fn register(
        &mut self,
        scheme: impl Into<String>,
        authenticator: impl Authenticator,
    ) -> Option<Arc<dyn Authenticator>> {
        let scheme = scheme.into();
        tracing::debug!(%scheme, "authenticator registered");
        self.schemes.insert(scheme, Arc::new(authenticator))
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, scheme: impl Into<String>, authenticator: impl Authenticator) -> Self {
        self.register(scheme, authenticator);
        self
    }

    /// Looks up the authenticator for `scheme`.
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Authenticator>> {
        self.schemes.get(scheme).cloned()
    }

    /// Whether `scheme` has an authenticator.
    pub fn contains(&self, scheme: &str) -> bool {
        self.schemes.contains_key(scheme)
    }

    /// Registered scheme names, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    #[async_trait]
    impl Authenticator for Fixed {
        async fn validate(
            &self,
            _carrier: &CredentialCarrier,
        ) -> Result<AuthResult, AuthenticatorError> {
            if self.0 {
                Ok(AuthResult::success("fixed", Attributes::new()))
            } else {
                Ok(AuthResult::failure(ReasonCode::InvalidCredentials, "nope"))
            }
        }
    }

    #[tokio::test]
    async fn test_registry_get_returns_registered_scheme() {
        let registry = AuthenticatorRegistry::new().with("allow", Fixed(true));

        let auth = registry.get("allow").expect("scheme should be registered");
        let result = auth
            .validate(&CredentialCarrier::password("a", "b"))
            .await
            .unwrap();

        assert!(result.is_success());
    }

    #[test]
    fn test_registry_get_unknown_scheme_returns_none() {
        let registry = AuthenticatorRegistry::new().with("allow", Fixed(true));

        assert!(registry.get("ldap").is_none());
        assert!(!registry.contains("ldap"));
    }

    #[test]
    fn test_registry_register_replaces_previous() {
        let mut registry = AuthenticatorRegistry::new();
        assert!(registry.register("s", Fixed(true)).is_none());
        assert!(registry.register("s", Fixed(false)).is_some());
        assert_eq!(registry.schemes(), vec!["s"]);
    }

    #[test]
    fn test_registry_debug_lists_schemes_sorted() {
        let registry = AuthenticatorRegistry::new()
            .with("token", Fixed(true))
            .with("password", Fixed(true));

        assert_eq!(
            format!("{registry:?}"),
            r#"AuthenticatorRegistry { schemes: ["password", "token"] }"#
        );
    }

    #[test]
    fn test_auth_result_constructors() {
        let ok = AuthResult::success("p", Attributes::new());
        assert!(ok.is_success());

        let failed = AuthResult::failure(ReasonCode::InvalidCredentials, "m");
        assert_eq!(
            failed,
            AuthResult::Failure {
                reason: ReasonCode::InvalidCredentials,
                message: "m".into(),
            }
        );
    }
}
