//! Per-connection handler: handshake, then authenticated traffic.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   0. Finish the transport upgrade under the handshake deadline
//!   1. Run the handshake through the [`HandshakeCoordinator`]
//!   2. Rejected or abandoned → close the connection, done
//!   3. Authenticated → hold a [`SessionGuard`] and pass every later frame
//!      to the [`SessionHandler`], as long as the session stays registered
//!
//! [`HandshakeCoordinator`]: crate::HandshakeCoordinator
//! [`SessionGuard`]: cachegate_session::SessionGuard

use std::sync::Arc;

use async_trait::async_trait;
use cachegate_session::Session;
use cachegate_transport::{Connection, Incoming};

use crate::server::ServerState;
use crate::{CachegateError, HandshakeOutcome};

/// What the server does with frames on an authenticated connection.
///
/// The cache protocol proper plugs in here. Every call is made with the
/// connection's current session, looked up right before the call, so a
/// revoked session never reaches the handler.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Handles one frame. A returned frame is sent back to the client.
    async fn on_frame(&self, session: &Session, frame: Vec<u8>) -> Option<Vec<u8>>;
}

/// A [`SessionHandler`] that accepts and discards every frame.
///
/// Useful when only the handshake matters: connections stay open and
/// authenticated until the client leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleHandler;

#[async_trait]
impl SessionHandler for IdleHandler {
    async fn on_frame(&self, session: &Session, frame: Vec<u8>) -> Option<Vec<u8>> {
        tracing::trace!(
            conn_id = %session.connection,
            len = frame.len(),
            "frame discarded"
        );
        None
    }
}

/// Handles a single connection from accept to close.
///
/// The transport upgrade and the first handshake frame share one
/// deadline, so a peer that connects and goes quiet is dropped after
/// `handshake_timeout` no matter which step it stalls in.
pub(crate) async fn handle_connection<I, H>(
    incoming: I,
    state: Arc<ServerState<H>>,
) -> Result<(), CachegateError>
where
    I: Incoming,
    H: SessionHandler,
{
    let deadline = state.coordinator.deadline();
    let peer = incoming.peer_addr();

    // --- Step 0: Transport upgrade ---
    let conn = match tokio::time::timeout_at(deadline, incoming.establish()).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            tracing::debug!(%peer, error = %e, "transport upgrade failed");
            return Ok(());
        }
        Err(_) => {
            tracing::info!(%peer, "transport upgrade timed out, handshake abandoned");
            return Ok(());
        }
    };
    let conn_id = conn.id();
    tracing::debug!(%conn_id, %peer, "handling new connection");

    // --- Step 1: Handshake ---
    let session = match state.coordinator.accept_until(&conn, deadline).await {
        HandshakeOutcome::Authenticated(session) => session,
        HandshakeOutcome::Rejected(reason) => {
            tracing::debug!(%conn_id, %reason, "closing rejected connection");
            let _ = conn.close().await;
            return Ok(());
        }
        HandshakeOutcome::Abandoned => {
            let _ = conn.close().await;
            return Ok(());
        }
    };

    // The session is registered; from here on the guard owns its removal.
    let sessions = Arc::clone(state.coordinator.sessions());
    let _guard = sessions.guard(conn_id);
    tracing::debug!(%conn_id, principal = %session.principal, "serving session");

    // --- Step 2: Frame loop ---
    loop {
        let frame = match conn.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        // A connection authenticates once. Another handshake gets
        // DUPLICATE_HANDSHAKE and the session carries on.
        if state.coordinator.is_handshake(&frame) {
            state.coordinator.handshake(&conn, &frame).await;
            continue;
        }

        let Some(session) = sessions.lookup(conn_id) else {
            tracing::info!(%conn_id, "session revoked, closing connection");
            break;
        };

        if let Some(reply) = state.handler.on_frame(&session, frame).await {
            conn.send(&reply).await?;
        }
    }

    let _ = conn.close().await;
    // _guard drops here → session revoked.
    Ok(())
}
