//! Client side of the handshake.
//!
//! [`connect`] opens a connection, sends exactly one credential message,
//! waits for exactly one acknowledgment, and hands back either an
//! [`AuthenticatedConnection`] or a [`ConnectError`] saying whether the
//! server refused the credential or the connection itself failed.
//!
//! ```rust,no_run
//! use cachegate::prelude::*;
//!
//! # async fn run() {
//! let credential = CredentialCarrier::password("super-user", "1234567");
//! match connect("127.0.0.1:40404", credential).await {
//!     Ok(conn) => println!("connected as {}", conn.principal()),
//!     Err(e) if e.class() == FailureClass::AuthFail => println!("bad credentials: {e}"),
//!     Err(e) => println!("could not reach the cache: {e}"),
//! }
//! # }
//! ```

use std::time::Duration;

use cachegate_protocol::{
    Attributes, Codec, CredentialCarrier, HandshakeAck, HandshakeRequest, JsonCodec, Principal,
    ProtocolError, ReasonCode,
};
use cachegate_transport::{
    Connection, ConnectionId, Dial, TransportError, WebSocketConnection, WebSocketDialer,
};
use tokio::time::Instant;
use zeroize::Zeroizing;

use crate::ClientConfig;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Coarse classification of a connection attempt, as seen by callers
/// that only care whether the credential or the network was at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The connection was established and authenticated.
    NoException,
    /// The server refused the credential.
    AuthFail,
    /// Anything else: unreachable server, dropped connection, timeout,
    /// unreadable acknowledgment.
    Transport,
}

impl FailureClass {
    /// Classifies the result of a connection attempt.
    pub fn of<T>(result: &Result<T, ConnectError>) -> Self {
        match result {
            Ok(_) => FailureClass::NoException,
            Err(e) => e.class(),
        }
    }
}

/// Why [`connect`] did not produce an authenticated connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The server evaluated the credential and refused it.
    #[error("authentication rejected: {reason}")]
    Rejected { reason: ReasonCode },

    /// The connection could not be opened, or broke during the handshake.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No acknowledgment arrived in time.
    #[error("no handshake acknowledgment within {0:?}")]
    Timeout(Duration),

    /// The server answered with something that isn't an acknowledgment.
    #[error("malformed handshake acknowledgment: {0}")]
    MalformedResponse(String),

    /// The handshake request could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ConnectError {
    /// `AuthFail` for a rejection, `Transport` for everything else.
    pub fn class(&self) -> FailureClass {
        match self {
            ConnectError::Rejected { .. } => FailureClass::AuthFail,
            _ => FailureClass::Transport,
        }
    }

    /// The server's reason code, for a rejection.
    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            ConnectError::Rejected { reason } => Some(*reason),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AuthenticatedConnection
// ---------------------------------------------------------------------------

/// A connection whose handshake the server accepted.
///
/// Frames sent from here on are cache traffic on behalf of
/// [`principal`](Self::principal).
pub struct AuthenticatedConnection<C: Connection = WebSocketConnection> {
    conn: C,
    principal: Principal,
    attributes: Attributes,
}

impl<C: Connection> AuthenticatedConnection<C> {
    /// The identity the server authenticated.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Attributes the server attached to the session.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// The underlying transport connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// The transport connection id.
    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    /// Sends one frame.
    pub async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        self.conn.send(data).await
    }

    /// Receives one frame; `Ok(None)` once the server closes.
    pub async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        self.conn.recv().await
    }

    /// Closes the connection. The server revokes the session.
    pub async fn close(&self) -> Result<(), TransportError> {
        self.conn.close().await
    }

    /// Unwraps the transport connection.
    pub fn into_inner(self) -> C {
        self.conn
    }
}

impl<C: Connection> std::fmt::Debug for AuthenticatedConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedConnection")
            .field("id", &self.conn.id())
            .field("principal", &self.principal)
            .field("attributes", &self.attributes)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// connect
// ---------------------------------------------------------------------------

/// Connects over WebSocket to `endpoint` (`host:port`) and authenticates
/// with `credential`, using default client settings.
///
/// # Errors
/// See [`ConnectError`]. There is no retry: a rejected client must open
/// a new connection.
pub async fn connect(
    endpoint: &str,
    credential: CredentialCarrier,
) -> Result<AuthenticatedConnection, ConnectError> {
    connect_with(&WebSocketDialer, endpoint, credential, &ClientConfig::default()).await
}

/// Connects over WebSocket using the credential and settings in `config`.
///
/// # Errors
/// See [`ConnectError`].
pub async fn connect_with_config(
    endpoint: &str,
    config: &ClientConfig,
) -> Result<AuthenticatedConnection, ConnectError> {
    connect_with(&WebSocketDialer, endpoint, config.credential(), config).await
}

/// Connects through any [`Dial`] implementation.
///
/// `config` supplies the scheme hint and the timeout, which bounds the
/// dial and the acknowledgment together. Its username and password are
/// not used (the credential is passed explicitly).
///
/// # Errors
/// See [`ConnectError`].
pub async fn connect_with<D: Dial>(
    dialer: &D,
    endpoint: &str,
    credential: CredentialCarrier,
    config: &ClientConfig,
) -> Result<AuthenticatedConnection<D::Connection>, ConnectError> {
    let mut request = HandshakeRequest::new(credential);
    if let Some(scheme) = &config.scheme {
        request = request.with_scheme(scheme.clone());
    }
    let encoded = Zeroizing::new(JsonCodec.encode(&request)?);
    drop(request);

    // One budget for the whole attempt: an unreachable host or a server
    // stuck mid-upgrade times out the same way a silent one does.
    let timeout = config.handshake_timeout();
    let deadline = Instant::now() + timeout;

    let conn = match tokio::time::timeout_at(deadline, dialer.dial(endpoint)).await {
        Ok(conn) => conn?,
        Err(_) => {
            tracing::debug!(endpoint, ?timeout, "dial timed out");
            return Err(ConnectError::Timeout(timeout));
        }
    };
    let conn_id = conn.id();

    let exchange = async {
        conn.send(&encoded).await?;
        conn.recv().await
    };
    let frame = match tokio::time::timeout_at(deadline, exchange).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => {
            return Err(ConnectError::Transport(TransportError::ConnectionClosed(
                "server closed the connection before acknowledging".into(),
            )));
        }
        Ok(Err(e)) => return Err(ConnectError::Transport(e)),
        Err(_) => {
            tracing::debug!(%conn_id, ?timeout, "handshake acknowledgment timed out");
            let _ = conn.close().await;
            return Err(ConnectError::Timeout(timeout));
        }
    };

    let ack: HandshakeAck = JsonCodec
        .decode(&frame)
        .map_err(|e| ConnectError::MalformedResponse(e.to_string()))?;

    match ack {
        HandshakeAck::AuthOk {
            principal,
            attributes,
        } => {
            tracing::debug!(%conn_id, %principal, "handshake accepted");
            Ok(AuthenticatedConnection {
                conn,
                principal,
                attributes,
            })
        }
        HandshakeAck::AuthFailed { reason } => {
            tracing::debug!(%conn_id, %reason, "handshake rejected");
            let _ = conn.close().await;
            Err(ConnectError::Rejected { reason })
        }
    }
}
