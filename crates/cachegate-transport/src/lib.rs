//! Transport abstraction layer for cachegate.
//!
//! Provides the [`Transport`], [`Dial`] and [`Connection`] traits that
//! abstract over the byte streams a cache server accepts and a cache
//! client opens. Everything above this crate (credential handshake,
//! sessions) only ever sees whole frames of bytes.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `tcp` (default): plain TCP with `u32` big-endian length-prefixed frames

mod error;
#[cfg(feature = "tcp")]
mod tcp;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "tcp")]
pub use tcp::{DEFAULT_MAX_FRAME_BYTES, TcpConnection, TcpDialer, TcpIncoming, TcpTransport};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketDialer, WebSocketIncoming, WebSocketTransport};

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs, shared by every
/// transport in the process so ids never collide across listeners.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique `ConnectionId`.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Accepts new incoming connections (server side).
///
/// Accepting is split in two. [`accept`](Transport::accept) only takes
/// the socket off the listener and must never wait on the peer; any
/// protocol negotiation (the WebSocket upgrade, for one) happens later in
/// [`Incoming::establish`], on the connection's own task, where the
/// caller can put a deadline on it. A peer that connects and then says
/// nothing therefore stalls only itself, not the accept loop.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// The not-yet-negotiated socket returned by [`accept`](Self::accept).
    type Incoming: Incoming<Connection = Self::Connection>;

    /// Waits for the next socket on the listener.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Incoming, TransportError>> + Send;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

/// An accepted socket whose transport-level negotiation has not run yet.
pub trait Incoming: Send + 'static {
    /// The connection type this socket turns into.
    type Connection: Connection;

    /// Runs the negotiation and yields a frame-level connection.
    ///
    /// This reads from the peer, so it can take as long as the peer
    /// wants. Bound it with a timeout.
    fn establish(
        self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// The peer's address.
    fn peer_addr(&self) -> SocketAddr;
}

/// Opens outbound connections (client side).
pub trait Dial: Send + Sync + 'static {
    /// The connection type produced by this dialer.
    type Connection: Connection;

    /// Connects to `addr` (`host:port`).
    ///
    /// # Errors
    /// Returns [`TransportError::ConnectFailed`] when the endpoint refuses
    /// or cannot be reached.
    fn dial(
        &self,
        addr: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive whole frames.
///
/// All methods take `&self`: implementations synchronize internally so a
/// receive can be raced against other work on the same connection.
pub trait Connection: Send + Sync + 'static {
    /// Sends one frame to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    /// Cancel-safe: dropping the future never loses part of a frame.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_new_and_into_inner() {
        let id = ConnectionId::new(42);
        assert_eq!(id.into_inner(), 42);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(7);
        assert_eq!(id.to_string(), "conn-7");
    }

    #[test]
    fn test_connection_id_next_is_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.into_inner() > a.into_inner());
    }

    #[test]
    fn test_connection_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ConnectionId::new(1), "alice");
        map.insert(ConnectionId::new(2), "bob");
        assert_eq!(map[&ConnectionId::new(1)], "alice");
    }
}
