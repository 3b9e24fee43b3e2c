//! Server and client configuration.
//!
//! Plain structs with sensible defaults. Each derives
//! `serde::Deserialize` so a deployment can fill it from whatever
//! property source it already has. The hyphenated aliases accept the
//! classic `security-*` property names.

use std::fmt;
use std::time::Duration;

use cachegate_protocol::{CredentialCarrier, DEFAULT_MAX_CREDENTIAL_BYTES};
use serde::Deserialize;

/// Default time allowed for a handshake to complete.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which transport the server listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// One WebSocket binary message per frame.
    #[default]
    WebSocket,
    /// `u32` big-endian length-prefixed frames over TCP.
    Tcp,
}

// ---------------------------------------------------------------------------
// HandshakeConfig
// ---------------------------------------------------------------------------

/// Limits applied to every handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Upper bound on an encoded handshake request. Larger requests are
    /// rejected with `OVERSIZED_MESSAGE` before parsing.
    pub max_credential_bytes: usize,

    /// Deadline for the whole handshake: receiving the request plus
    /// validating it.
    pub handshake_timeout_ms: u64,
}

impl HandshakeConfig {
    /// The handshake deadline as a `Duration`.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Sets the request size limit.
    pub fn with_max_credential_bytes(mut self, max: usize) -> Self {
        self.max_credential_bytes = max;
        self
    }

    /// Sets the handshake deadline.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = duration_ms(timeout);
        self
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            max_credential_bytes: DEFAULT_MAX_CREDENTIAL_BYTES,
            handshake_timeout_ms: duration_ms(DEFAULT_HANDSHAKE_TIMEOUT),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Everything a [`CacheServer`](crate::CacheServer) needs besides its
/// authenticator instances.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on (`host:port`).
    pub bind: String,

    /// Name of the scheme every handshake is validated with.
    #[serde(alias = "security-client-authenticator")]
    pub authenticator: String,

    /// Listener type.
    pub transport: TransportKind,

    /// Handshake limits.
    pub handshake: HandshakeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:40404".to_string(),
            authenticator: "password".to_string(),
            transport: TransportKind::default(),
            handshake: HandshakeConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Client-side connection settings.
///
/// ```rust
/// use cachegate::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(
///     r#"{"security-username": "super-user", "security-password": "1234567"}"#,
/// ).unwrap();
///
/// assert_eq!(config.credential().principal(), Some("super-user"));
/// assert!(!format!("{config:?}").contains("1234567"));
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(alias = "security-username")]
    pub security_username: String,

    #[serde(alias = "security-password")]
    pub security_password: String,

    /// Optional scheme hint sent with the handshake. The server rejects
    /// the handshake if it disagrees with its configured scheme.
    pub scheme: Option<String>,

    /// How long a whole connect may take: dialing, any transport
    /// upgrade, and waiting for the acknowledgment.
    pub handshake_timeout_ms: u64,
}

impl ClientConfig {
    /// Settings for a principal + secret login with default timeouts.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            security_username: username.into(),
            security_password: password.into(),
            ..Self::default()
        }
    }

    /// Sets the scheme hint.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    /// Sets the connect timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = duration_ms(timeout);
        self
    }

    /// The connect timeout as a `Duration`.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Builds the credential carrier for these settings.
    pub fn credential(&self) -> CredentialCarrier {
        CredentialCarrier::password(&*self.security_username, &*self.security_password)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            security_username: String::new(),
            security_password: String::new(),
            scheme: None,
            handshake_timeout_ms: duration_ms(DEFAULT_HANDSHAKE_TIMEOUT),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("security_username", &self.security_username)
            .field("security_password", &"<redacted>")
            .field("scheme", &self.scheme)
            .field("handshake_timeout_ms", &self.handshake_timeout_ms)
            .finish()
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
