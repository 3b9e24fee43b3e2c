//! Reference authenticator: principal + secret against a credential store.
//!
//! The client sends a `principal` text field and a secret `secret` text
//! field (see [`CredentialCarrier::password`]). The authenticator looks
//! the principal up in a [`CredentialStore`] and checks the secret:
//!
//! - [`StoredSecret::Plain`] is compared in constant time.
//! - [`StoredSecret::Bcrypt`] is verified with `bcrypt`.
//!
//! Lookup and verification run on tokio's blocking pool, so a slow store
//! or an expensive hash never stalls other connections.
//!
//! An unknown principal and a wrong secret produce the same
//! `INVALID_CREDENTIALS` verdict with the same message.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use cachegate_protocol::{
    Attributes, CredentialCarrier, PRINCIPAL_FIELD, Principal, ReasonCode, SECRET_FIELD,
};
use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::{AuthResult, Authenticator, AuthenticatorError};

// ---------------------------------------------------------------------------
// Stored credentials
// ---------------------------------------------------------------------------

/// How a principal's secret is kept in the store.
#[derive(Clone, PartialEq, Eq)]
pub enum StoredSecret {
    /// The secret itself. Only sensible for tests and fixtures.
    Plain(String),
    /// A bcrypt hash (`$2b$...`).
    Bcrypt(String),
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredSecret::Plain(_) => f.write_str("Plain(<redacted>)"),
            StoredSecret::Bcrypt(_) => f.write_str("Bcrypt(<redacted>)"),
        }
    }
}

/// What the store knows about one principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub secret: StoredSecret,
    pub attributes: Attributes,
}

/// A read-mostly source of stored credentials.
///
/// Implementations handle their own concurrency: the authenticator calls
/// `lookup` from many threads at once without any outside locking.
pub trait CredentialStore: Send + Sync + 'static {
    /// Finds the stored credential for `principal`.
    ///
    /// # Errors
    /// Returns [`AuthenticatorError::StoreUnavailable`] if the store
    /// can't be read. An unknown principal is `Ok(None)`, not an error.
    fn lookup(&self, principal: &str) -> Result<Option<StoredCredential>, AuthenticatorError>;
}

/// A `HashMap`-backed [`CredentialStore`] behind a `parking_lot::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    entries: RwLock<HashMap<String, StoredCredential>>,
}

impl InMemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a principal with a plaintext secret.
    pub fn insert_plain(
        &self,
        principal: impl Into<String>,
        secret: impl Into<String>,
        attributes: Attributes,
    ) {
        self.insert(
            principal,
            StoredCredential {
                secret: StoredSecret::Plain(secret.into()),
                attributes,
            },
        );
    }

    /// Hashes `secret` with bcrypt at `cost` and stores the hash.
    ///
    /// # Errors
    /// Returns [`AuthenticatorError::Internal`] if hashing fails (e.g. an
    /// out-of-range cost).
    pub fn insert_hashed(
        &self,
        principal: impl Into<String>,
        secret: &str,
        cost: u32,
        attributes: Attributes,
    ) -> Result<(), AuthenticatorError> {
        let hash = bcrypt::hash(secret, cost)
            .map_err(|e| AuthenticatorError::Internal(format!("bcrypt hash failed: {e}")))?;
        self.insert(
            principal,
            StoredCredential {
                secret: StoredSecret::Bcrypt(hash),
                attributes,
            },
        );
        Ok(())
    }

    /// Builder-style [`insert_plain`](Self::insert_plain).
    pub fn with_plain(
        self,
        principal: impl Into<String>,
        secret: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        self.insert_plain(principal, secret, attributes);
        self
    }

    /// Removes a principal. Returns `true` if it existed.
    pub fn remove(&self, principal: &str) -> bool {
        self.entries.write().remove(principal).is_some()
    }

    /// Number of principals.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the store has no principals.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Adds (or replaces) a principal with an already-prepared credential,
    /// e.g. a bcrypt hash loaded from configuration.
    pub fn insert(&self, principal: impl Into<String>, credential: StoredCredential) {
        self.entries.write().insert(principal.into(), credential);
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn lookup(&self, principal: &str) -> Result<Option<StoredCredential>, AuthenticatorError> {
        Ok(self.entries.read().get(principal).cloned())
    }
}

impl<S: CredentialStore> CredentialStore for Arc<S> {
    fn lookup(&self, principal: &str) -> Result<Option<StoredCredential>, AuthenticatorError> {
        (**self).lookup(principal)
    }
}

// ---------------------------------------------------------------------------
// PasswordAuthenticator
// ---------------------------------------------------------------------------

const REJECTED: &str = "unknown principal or wrong secret";

/// Validates `principal` / `secret` fields against a [`CredentialStore`].
pub struct PasswordAuthenticator<S: CredentialStore> {
    store: Arc<S>,
}

impl<S: CredentialStore> PasswordAuthenticator<S> {
    /// Scheme name this authenticator is conventionally registered under.
    pub const SCHEME: &'static str = "password";

    /// Creates an authenticator backed by `store`.
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Creates an authenticator sharing an existing store handle.
    pub fn from_shared(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[async_trait]
impl<S: CredentialStore> Authenticator for PasswordAuthenticator<S> {
    async fn validate(
        &self,
        carrier: &CredentialCarrier,
    ) -> Result<AuthResult, AuthenticatorError> {
        let (Some(principal), Some(secret)) =
            (carrier.principal(), carrier.text(SECRET_FIELD))
        else {
            return Ok(AuthResult::failure(
                ReasonCode::MalformedCredential,
                format!("password scheme needs `{PRINCIPAL_FIELD}` and `{SECRET_FIELD}` text fields"),
            ));
        };

        let store = Arc::clone(&self.store);
        let principal = principal.to_string();
        let secret = Zeroizing::new(secret.to_string());

        tokio::task::spawn_blocking(move || check(store.as_ref(), &principal, &secret))
            .await
            .map_err(|e| AuthenticatorError::Internal(format!("credential check aborted: {e}")))?
    }
}

fn check<S: CredentialStore>(
    store: &S,
    principal: &str,
    secret: &str,
) -> Result<AuthResult, AuthenticatorError> {
    let Some(stored) = store.lookup(principal)? else {
        return Ok(AuthResult::failure(ReasonCode::InvalidCredentials, REJECTED));
    };

    let matches = match &stored.secret {
        StoredSecret::Plain(expected) => constant_time_eq(expected.as_bytes(), secret.as_bytes()),
        StoredSecret::Bcrypt(hash) => bcrypt::verify(secret, hash)
            .map_err(|e| AuthenticatorError::Internal(format!("stored bcrypt hash unusable: {e}")))?,
    };

    if matches {
        Ok(AuthResult::Success {
            principal: Principal::new(principal),
            attributes: stored.attributes,
        })
    } else {
        Ok(AuthResult::failure(ReasonCode::InvalidCredentials, REJECTED))
    }
}

/// Compares two byte strings without an early exit on the first
/// mismatch. Only the length difference is observable through timing.
fn constant_time_eq(expected: &[u8], presented: &[u8]) -> bool {
    let max_len = expected.len().max(presented.len());
    let mut diff = expected.len() ^ presented.len();

    for idx in 0..max_len {
        let left = expected.get(idx).copied().unwrap_or(0);
        let right = presented.get(idx).copied().unwrap_or(0);
        diff |= usize::from(left ^ right);
    }

    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(role: &str) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("role".into(), role.into());
        attributes
    }

    fn authenticator() -> PasswordAuthenticator<InMemoryCredentialStore> {
        PasswordAuthenticator::new(
            InMemoryCredentialStore::new().with_plain("super-user", "1234567", attrs("admin")),
        )
    }

    #[tokio::test]
    async fn test_validate_correct_secret_returns_success_with_attributes() {
        let auth = authenticator();

        let result = auth
            .validate(&CredentialCarrier::password("super-user", "1234567"))
            .await
            .unwrap();

        assert_eq!(result, AuthResult::success("super-user", attrs("admin")));
    }

    #[tokio::test]
    async fn test_validate_wrong_secret_returns_invalid_credentials() {
        let auth = authenticator();

        let result = auth
            .validate(&CredentialCarrier::password("super-user", "wrong"))
            .await
            .unwrap();

        assert!(matches!(
            result,
            AuthResult::Failure { reason: ReasonCode::InvalidCredentials, .. }
        ));
    }

    #[tokio::test]
    async fn test_validate_unknown_principal_looks_like_wrong_secret() {
        let auth = authenticator();

        let unknown = auth
            .validate(&CredentialCarrier::password("nobody", "1234567"))
            .await
            .unwrap();
        let wrong = auth
            .validate(&CredentialCarrier::password("super-user", "nope"))
            .await
            .unwrap();

        assert_eq!(unknown, wrong);
    }

    #[tokio::test]
    async fn test_validate_missing_secret_field_is_malformed() {
        let auth = authenticator();
        let carrier = CredentialCarrier::builder()
            .text(PRINCIPAL_FIELD, "super-user")
            .build()
            .unwrap();

        let result = auth.validate(&carrier).await.unwrap();

        assert!(matches!(
            result,
            AuthResult::Failure { reason: ReasonCode::MalformedCredential, .. }
        ));
    }

    #[tokio::test]
    async fn test_validate_byte_secret_is_malformed() {
        let auth = authenticator();
        let carrier = CredentialCarrier::builder()
            .text(PRINCIPAL_FIELD, "super-user")
            .secret_bytes(SECRET_FIELD, b"1234567".to_vec())
            .build()
            .unwrap();

        let result = auth.validate(&carrier).await.unwrap();

        assert!(matches!(
            result,
            AuthResult::Failure { reason: ReasonCode::MalformedCredential, .. }
        ));
    }

    #[tokio::test]
    async fn test_validate_bcrypt_secret() {
        let store = InMemoryCredentialStore::new();
        store
            .insert_hashed("carol", "s3cret", 4, Attributes::new())
            .unwrap();
        let auth = PasswordAuthenticator::new(store);

        let ok = auth
            .validate(&CredentialCarrier::password("carol", "s3cret"))
            .await
            .unwrap();
        let bad = auth
            .validate(&CredentialCarrier::password("carol", "s3cre"))
            .await
            .unwrap();

        assert!(ok.is_success());
        assert!(!bad.is_success());
    }

    #[tokio::test]
    async fn test_validate_corrupt_hash_returns_error() {
        let store = InMemoryCredentialStore::new();
        store.insert(
            "dave",
            StoredCredential {
                secret: StoredSecret::Bcrypt("not-a-hash".into()),
                attributes: Attributes::new(),
            },
        );
        let auth = PasswordAuthenticator::new(store);

        let result = auth
            .validate(&CredentialCarrier::password("dave", "x"))
            .await;

        assert!(matches!(result, Err(AuthenticatorError::Internal(_))));
    }

    struct DownStore;

    impl CredentialStore for DownStore {
        fn lookup(&self, _: &str) -> Result<Option<StoredCredential>, AuthenticatorError> {
            Err(AuthenticatorError::StoreUnavailable("ldap timeout".into()))
        }
    }

    #[tokio::test]
    async fn test_validate_store_outage_returns_error() {
        let auth = PasswordAuthenticator::new(DownStore);

        let result = auth
            .validate(&CredentialCarrier::password("super-user", "1234567"))
            .await;

        assert!(matches!(result, Err(AuthenticatorError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_shared_store_sees_later_inserts() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let auth = PasswordAuthenticator::from_shared(Arc::clone(&store));

        store.insert_plain("erin", "pw", Attributes::new());

        let result = auth
            .validate(&CredentialCarrier::password("erin", "pw"))
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(auth.store().len(), 1);
    }

    #[test]
    fn test_stored_secret_debug_is_redacted() {
        let rendered = format!("{:?}", StoredSecret::Plain("1234567".into()));
        assert!(!rendered.contains("1234567"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(!constant_time_eq(b"", b"a"));
        assert!(constant_time_eq(b"", b""));
    }
}
