//! # cachegate
//!
//! Client authentication for a distributed in-memory cache.
//!
//! Before a cache server accepts a single operation on a connection, the
//! client presents a credential and the server validates it through a
//! pluggable [`Authenticator`](cachegate_session::Authenticator). This
//! crate ties the layers together:
//!
//! - [`HandshakeCoordinator`] runs the per-connection handshake and
//!   records successful ones in a [`SessionRegistry`](cachegate_session::SessionRegistry).
//! - [`CacheServer`] accepts connections and runs the coordinator on
//!   each, then hands authenticated traffic to a [`SessionHandler`].
//! - [`connect`] is the client side: one credential out, one verdict in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cachegate::prelude::*;
//!
//! # async fn run() -> Result<(), CachegateError> {
//! let store = InMemoryCredentialStore::new()
//!     .with_plain("super-user", "1234567", Attributes::new());
//!
//! let server = CacheServer::builder()
//!     .bind("127.0.0.1:0")
//!     .authenticator("password", PasswordAuthenticator::new(store))
//!     .build()
//!     .await?;
//! let addr = server.local_addr().expect("bound").to_string();
//! tokio::spawn(server.run());
//!
//! let conn = connect(&addr, CredentialCarrier::password("super-user", "1234567"))
//!     .await
//!     .expect("valid credentials");
//! assert_eq!(conn.principal(), "super-user");
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod handler;
mod handshake;
mod server;

pub use client::{
    AuthenticatedConnection, ConnectError, FailureClass, connect, connect_with,
    connect_with_config,
};
pub use config::{
    ClientConfig, DEFAULT_HANDSHAKE_TIMEOUT, HandshakeConfig, ServerConfig, TransportKind,
};
pub use error::CachegateError;
pub use handler::{IdleHandler, SessionHandler};
pub use handshake::{HandshakeCoordinator, HandshakeOutcome};
pub use server::{CacheServer, CacheServerBuilder};

/// Everything needed to run a server or connect a client.
pub mod prelude {
    pub use crate::{
        AuthenticatedConnection, CacheServer, CacheServerBuilder, CachegateError, ClientConfig,
        ConnectError, FailureClass, HandshakeConfig, HandshakeCoordinator, HandshakeOutcome,
        IdleHandler, ServerConfig, SessionHandler, TransportKind, connect, connect_with,
        connect_with_config,
    };

    pub use cachegate_protocol::{
        Attributes, CredentialCarrier, HandshakeAck, HandshakeRequest, PROTOCOL_VERSION,
        Principal, ReasonCode,
    };
    pub use cachegate_session::{
        AuthResult, Authenticator, AuthenticatorError, AuthenticatorRegistry, CredentialStore,
        InMemoryCredentialStore, PasswordAuthenticator, Session, SessionRegistry,
        StoredCredential, StoredSecret,
    };
    pub use cachegate_transport::{
        Connection, ConnectionId, Dial, Incoming, TcpDialer, Transport, TransportError,
        WebSocketDialer,
    };
}
