//! `CacheServer` builder and server loop.
//!
//! This is the entry point for running a cachegate server. It ties
//! together all the layers: transport → protocol → handshake → session.
//!
//! The accept loop does as little as possible. It takes a socket off the
//! listener and immediately spawns a task for it; the transport upgrade,
//! the handshake and all later traffic run on that task. A slow or
//! hostile peer therefore only ever holds up its own task, and the loop
//! is back in `accept()` right away.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cachegate_session::{Authenticator, AuthenticatorRegistry, SessionRegistry};
use cachegate_transport::{Transport, TcpTransport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{
    CachegateError, HandshakeConfig, HandshakeCoordinator, IdleHandler, ServerConfig,
    SessionHandler, TransportKind,
};

/// Shared server state passed to each connection handler task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. Nothing in
/// here needs a lock: the session registry synchronizes itself and
/// everything else is read-only.
pub(crate) struct ServerState<H: SessionHandler> {
    pub(crate) coordinator: HandshakeCoordinator,
    pub(crate) handler: H,
}

/// Builder for configuring and starting a cachegate server.
///
/// # Example
///
/// ```rust,no_run
/// use cachegate::prelude::*;
///
/// # async fn run() -> Result<(), CachegateError> {
/// let store = InMemoryCredentialStore::new()
///     .with_plain("super-user", "1234567", Attributes::new());
///
/// let server = CacheServer::builder()
///     .bind("0.0.0.0:40404")
///     .authenticator("password", PasswordAuthenticator::new(store))
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct CacheServerBuilder<H: SessionHandler = IdleHandler> {
    config: ServerConfig,
    authenticators: AuthenticatorRegistry,
    sessions: Arc<SessionRegistry>,
    handler: H,
}

impl CacheServerBuilder<IdleHandler> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::from_config(ServerConfig::default())
    }

    /// Creates a builder from a loaded [`ServerConfig`].
    pub fn from_config(config: ServerConfig) -> Self {
        Self {
            config,
            authenticators: AuthenticatorRegistry::new(),
            sessions: Arc::new(SessionRegistry::new()),
            handler: IdleHandler,
        }
    }
}

impl Default for CacheServerBuilder<IdleHandler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: SessionHandler> CacheServerBuilder<H> {
    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets the scheme every handshake is validated with.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.config.authenticator = scheme.into();
        self
    }

    /// Registers an authenticator under `scheme`.
    ///
    /// Registering does not select it: handshakes always use the scheme
    /// set with [`scheme`](Self::scheme) (`password` by default).
    pub fn authenticator(mut self, scheme: &str, authenticator: impl Authenticator) -> Self {
        self.authenticators.register(scheme, authenticator);
        self
    }

    /// Replaces the whole authenticator registry.
    pub fn authenticators(mut self, registry: AuthenticatorRegistry) -> Self {
        self.authenticators = registry;
        self
    }

    /// Sets the handshake limits.
    pub fn handshake(mut self, config: HandshakeConfig) -> Self {
        self.config.handshake = config;
        self
    }

    /// Sets the handshake deadline.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake = self.config.handshake.with_handshake_timeout(timeout);
        self
    }

    /// Sets the handshake request size limit.
    pub fn max_credential_bytes(mut self, max: usize) -> Self {
        self.config.handshake = self.config.handshake.with_max_credential_bytes(max);
        self
    }

    /// Records sessions in an existing registry instead of a fresh one.
    pub fn sessions(mut self, sessions: Arc<SessionRegistry>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Sets what happens to frames on authenticated connections.
    pub fn handler<H2: SessionHandler>(self, handler: H2) -> CacheServerBuilder<H2> {
        CacheServerBuilder {
            config: self.config,
            authenticators: self.authenticators,
            sessions: self.sessions,
            handler,
        }
    }

    /// The configuration built so far.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds a WebSocket listener and builds the server.
    pub async fn build(self) -> Result<CacheServer<WebSocketTransport, H>, CachegateError> {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;
        Ok(self.build_with(transport))
    }

    /// Binds a length-prefixed TCP listener and builds the server.
    pub async fn build_tcp(self) -> Result<CacheServer<TcpTransport, H>, CachegateError> {
        let transport = TcpTransport::bind(&self.config.bind).await?;
        Ok(self.build_with(transport))
    }

    /// Builds the server on an already-bound transport.
    pub fn build_with<T: Transport>(self, transport: T) -> CacheServer<T, H> {
        let scheme = self.config.authenticator;
        if !self.authenticators.contains(&scheme) {
            tracing::warn!(
                %scheme,
                registered = ?self.authenticators.schemes(),
                "configured scheme has no authenticator; every handshake will be rejected"
            );
        }

        let coordinator =
            HandshakeCoordinator::new(Arc::new(self.authenticators), scheme, self.sessions)
                .with_config(self.config.handshake);

        CacheServer {
            transport,
            state: Arc::new(ServerState {
                coordinator,
                handler: self.handler,
            }),
        }
    }

    /// Binds the transport named in the configuration and runs the
    /// server until the process is terminated.
    pub async fn run(self) -> Result<(), CachegateError> {
        match self.config.transport {
            TransportKind::WebSocket => self.build().await?.run().await,
            TransportKind::Tcp => self.build_tcp().await?.run().await,
        }
    }
}

/// A running cachegate server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CacheServer<T: Transport, H: SessionHandler = IdleHandler> {
    transport: T,
    state: Arc<ServerState<H>>,
}

impl CacheServer<WebSocketTransport, IdleHandler> {
    /// Creates a new builder.
    pub fn builder() -> CacheServerBuilder {
        CacheServerBuilder::new()
    }
}

impl<T: Transport, H: SessionHandler> CacheServer<T, H> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// The registry of authenticated connections.
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        Arc::clone(self.state.coordinator.sessions())
    }

    /// The scheme handshakes are validated with.
    pub fn scheme(&self) -> &str {
        self.state.coordinator.scheme()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming sockets and spawns a handler task for each one.
    /// Runs until the process is terminated.
    ///
    /// A failed `accept()` is logged and the loop keeps going: one bad
    /// socket (say, reset before it was handed over) must not take the
    /// listener down. Errors inside a connection task end only that task.
    pub async fn run(mut self) -> Result<(), CachegateError> {
        tracing::info!(
            addr = ?self.transport.local_addr().ok(),
            scheme = %self.state.coordinator.scheme(),
            "cachegate server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(incoming) => {
                    // `Arc::clone` only bumps a reference count; every task
                    // shares the same coordinator and handler.
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(incoming, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
