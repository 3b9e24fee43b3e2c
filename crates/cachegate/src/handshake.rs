//! The per-connection handshake: one credential in, one verdict out.
//!
//! [`HandshakeCoordinator`] runs the protocol sequence for a freshly
//! accepted connection:
//!
//! ```text
//!   already a session?  ── yes ─→ DUPLICATE_HANDSHAKE
//!   frame too large?    ── yes ─→ OVERSIZED_MESSAGE      (nothing parsed)
//!   decodes + version?  ── no ──→ MALFORMED_CREDENTIAL
//!   scheme available?   ── no ──→ UNSUPPORTED_SCHEME
//!   validate (once, own task, raced against the peer closing)
//!       Success ─→ register session ─→ AUTH_OK
//!       Failure ─→ AUTH_FAILED(reason)
//!       Err / panic ─→ AUTHENTICATOR_ERROR
//! ```
//!
//! Exactly one acknowledgment is written unless the handshake is
//! abandoned (peer vanished, deadline passed). The coordinator never
//! closes the connection; what happens to it next is the caller's call.

use std::sync::Arc;

use cachegate_protocol::{
    Codec, CredentialCarrier, HandshakeAck, HandshakeRequest, JsonCodec, ProtocolError,
    ReasonCode, decode_handshake_request,
};
use cachegate_session::{
    AuthResult, Authenticator, AuthenticatorRegistry, Session, SessionError, SessionRegistry,
};
use cachegate_transport::{Connection, TransportError};
use tokio::time::Instant;

use crate::{CachegateError, HandshakeConfig};

/// How a handshake ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// `AUTH_OK` was written and the session is registered.
    Authenticated(Session),

    /// `AUTH_FAILED(reason)` was written. No session exists.
    Rejected(ReasonCode),

    /// The peer went away, or the deadline passed, before a verdict could
    /// be delivered. No acknowledgment was written and no session exists.
    Abandoned,
}

impl HandshakeOutcome {
    /// The session, if the handshake succeeded.
    pub fn session(&self) -> Option<&Session> {
        match self {
            HandshakeOutcome::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// The rejection reason, if the handshake was rejected.
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            HandshakeOutcome::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Runs handshakes against a fixed scheme, authenticator set, and
/// session registry.
///
/// One coordinator is shared by every connection task. It holds no
/// per-connection state, so concurrent handshakes don't interact except
/// through the [`SessionRegistry`].
pub struct HandshakeCoordinator<C: Codec = JsonCodec> {
    authenticators: Arc<AuthenticatorRegistry>,
    scheme: String,
    sessions: Arc<SessionRegistry>,
    codec: C,
    config: HandshakeConfig,
}

impl HandshakeCoordinator<JsonCodec> {
    /// Creates a coordinator that validates every handshake with the
    /// authenticator registered under `scheme`, using JSON and default
    /// limits.
    pub fn new(
        authenticators: Arc<AuthenticatorRegistry>,
        scheme: impl Into<String>,
        sessions: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            authenticators,
            scheme: scheme.into(),
            sessions,
            codec: JsonCodec,
            config: HandshakeConfig::default(),
        }
    }
}

impl<C: Codec> HandshakeCoordinator<C> {
    /// Replaces the handshake limits.
    pub fn with_config(mut self, config: HandshakeConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the codec.
    pub fn with_codec<C2: Codec>(self, codec: C2) -> HandshakeCoordinator<C2> {
        HandshakeCoordinator {
            authenticators: self.authenticators,
            scheme: self.scheme,
            sessions: self.sessions,
            codec,
            config: self.config,
        }
    }

    /// The configured scheme name.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The handshake limits.
    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// The registry sessions are recorded in.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Waits for the connection's first frame and runs the handshake on
    /// it, all within the configured deadline.
    ///
    /// A frame the transport refuses as too large is answered with
    /// `OVERSIZED_MESSAGE`. A peer that closes or stays silent past the
    /// deadline is `Abandoned`.
    pub async fn accept<T: Connection>(&self, conn: &T) -> HandshakeOutcome {
        let deadline = self.deadline();
        self.accept_until(conn, deadline).await
    }

    /// [`accept`](Self::accept) against a deadline the caller already
    /// started, e.g. before a transport upgrade.
    pub async fn accept_until<T: Connection>(
        &self,
        conn: &T,
        deadline: Instant,
    ) -> HandshakeOutcome {
        let conn_id = conn.id();

        let frame = match tokio::time::timeout_at(deadline, conn.recv()).await {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => {
                tracing::debug!(%conn_id, "peer closed before handshake");
                return HandshakeOutcome::Abandoned;
            }
            Ok(Err(TransportError::FrameTooLarge { size, max })) => {
                tracing::warn!(%conn_id, size, max, "handshake frame refused by transport");
                return self.reject(conn, ReasonCode::OversizedMessage).await;
            }
            Ok(Err(e)) => {
                tracing::debug!(%conn_id, error = %e, "recv failed before handshake");
                return HandshakeOutcome::Abandoned;
            }
            Err(_) => {
                tracing::info!(%conn_id, "handshake timed out");
                return HandshakeOutcome::Abandoned;
            }
        };

        self.run(conn, &frame, deadline).await
    }

    /// Runs the handshake on an already-received request frame.
    ///
    /// Validation must finish within the configured deadline, counted
    /// from this call.
    pub async fn handshake<T: Connection>(&self, conn: &T, frame: &[u8]) -> HandshakeOutcome {
        let deadline = self.deadline();
        self.run(conn, frame, deadline).await
    }

    /// A handshake deadline starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.config.handshake_timeout()
    }

    /// Whether `frame` is a handshake request in this coordinator's
    /// codec. Only the shape is checked; size and version are not.
    pub fn is_handshake(&self, frame: &[u8]) -> bool {
        self.codec.decode::<HandshakeRequest>(frame).is_ok()
    }

    /// Writes `AUTH_FAILED(reason)` and returns `Rejected(reason)`.
    pub async fn reject<T: Connection>(&self, conn: &T, reason: ReasonCode) -> HandshakeOutcome {
        let conn_id = conn.id();
        tracing::warn!(%conn_id, %reason, "handshake rejected");

        if let Err(e) = self.send_ack(conn, &HandshakeAck::AuthFailed { reason }).await {
            tracing::debug!(%conn_id, error = %e, "failed to deliver rejection");
        }
        HandshakeOutcome::Rejected(reason)
    }

    async fn run<T: Connection>(
        &self,
        conn: &T,
        frame: &[u8],
        deadline: Instant,
    ) -> HandshakeOutcome {
        let conn_id = conn.id();

        // --- Step 0: one session per connection ---
        if self.sessions.contains(conn_id) {
            return self.reject(conn, ReasonCode::DuplicateHandshake).await;
        }

        // --- Steps 1-2: size, then structure and version ---
        let request = match decode_handshake_request(
            &self.codec,
            frame,
            self.config.max_credential_bytes,
        ) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(%conn_id, problem = %describe(&e), "undecodable handshake");
                return self.reject(conn, e.reason_code()).await;
            }
        };
        let HandshakeRequest {
            scheme: hint,
            credential,
            ..
        } = request;

        // --- Step 3: the configured scheme, never the client's ---
        if let Some(hint) = hint.as_deref().filter(|hint| *hint != self.scheme) {
            tracing::debug!(%conn_id, hint, configured = %self.scheme, "scheme hint mismatch");
            return self.reject(conn, ReasonCode::UnsupportedScheme).await;
        }
        let Some(authenticator) = self.authenticators.get(&self.scheme) else {
            tracing::error!(%conn_id, scheme = %self.scheme, "no authenticator registered");
            return self.reject(conn, ReasonCode::UnsupportedScheme).await;
        };

        // --- Step 4: validate exactly once ---
        let Some(verdict) = self.validate(conn, authenticator, credential, deadline).await else {
            return HandshakeOutcome::Abandoned;
        };

        // --- Steps 5-6: deliver the verdict ---
        match verdict {
            AuthResult::Success {
                principal,
                attributes,
            } => {
                let session = Session::new(conn_id, principal, attributes);
                let session = match self.sessions.register(session) {
                    Ok(session) => session,
                    Err(SessionError::AlreadyAuthenticated(_)) => {
                        return self.reject(conn, ReasonCode::DuplicateHandshake).await;
                    }
                };

                let ack = HandshakeAck::AuthOk {
                    principal: session.principal.clone(),
                    attributes: session.attributes.clone(),
                };
                if let Err(e) = self.send_ack(conn, &ack).await {
                    tracing::debug!(%conn_id, error = %e, "failed to deliver AUTH_OK");
                    self.sessions.revoke(conn_id);
                    return HandshakeOutcome::Abandoned;
                }

                tracing::info!(
                    %conn_id,
                    principal = %session.principal,
                    scheme = %self.scheme,
                    "handshake accepted"
                );
                HandshakeOutcome::Authenticated(session)
            }
            AuthResult::Failure { reason, message } => {
                tracing::info!(%conn_id, %reason, detail = %message, "credential refused");
                self.reject(conn, reason).await
            }
        }
    }

    /// Runs `validate` on its own task, racing it against the peer
    /// closing and the deadline. Returns `None` if the handshake should
    /// be abandoned; the validation task then finishes on its own and its
    /// result is dropped.
    ///
    /// Frames the peer sends while validation is running are discarded.
    async fn validate<T: Connection>(
        &self,
        conn: &T,
        authenticator: Arc<dyn Authenticator>,
        credential: CredentialCarrier,
        deadline: Instant,
    ) -> Option<AuthResult> {
        let conn_id = conn.id();
        let mut validation =
            tokio::spawn(async move { authenticator.validate(&credential).await });

        let joined = loop {
            tokio::select! {
                biased;

                joined = &mut validation => break joined,

                received = conn.recv() => match received {
                    Ok(Some(_)) => {
                        tracing::debug!(%conn_id, "discarding frame received during validation");
                    }
                    Ok(None) => {
                        tracing::debug!(%conn_id, "peer closed during validation");
                        return None;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv failed during validation");
                        return None;
                    }
                },

                () = tokio::time::sleep_until(deadline) => {
                    tracing::info!(%conn_id, "handshake timed out during validation");
                    return None;
                }
            }
        };

        Some(match joined {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::error!(%conn_id, error = %e, "authenticator failed");
                AuthResult::failure(ReasonCode::AuthenticatorError, e.to_string())
            }
            Err(e) => {
                tracing::error!(%conn_id, error = %e, "authenticator task did not complete");
                AuthResult::failure(ReasonCode::AuthenticatorError, "authenticator panicked")
            }
        })
    }

    async fn send_ack<T: Connection>(
        &self,
        conn: &T,
        ack: &HandshakeAck,
    ) -> Result<(), CachegateError> {
        let bytes = self.codec.encode(ack)?;
        conn.send(&bytes).await?;
        Ok(())
    }
}

/// Log-safe description of a decode failure. Decoder messages can quote
/// pieces of the input, and the input may hold secrets.
fn describe(err: &ProtocolError) -> String {
    match err {
        ProtocolError::Decode(e) => {
            format!("{:?} error at line {} column {}", e.classify(), e.line(), e.column())
        }
        other => other.to_string(),
    }
}

impl<C: Codec + std::fmt::Debug> std::fmt::Debug for HandshakeCoordinator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeCoordinator")
            .field("scheme", &self.scheme)
            .field("authenticators", &self.authenticators)
            .field("codec", &self.codec)
            .field("config", &self.config)
            .finish()
    }
}
