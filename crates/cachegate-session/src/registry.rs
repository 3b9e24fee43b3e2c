//! The session registry: which connections are authenticated, as whom.
//!
//! One registry is shared (via `Arc`) by every connection task in the
//! server process. It is backed by a `parking_lot::RwLock`, so:
//!
//! - `register`, `lookup`, `revoke` on one connection id are
//!   linearizable: once `revoke` returns, no later `lookup` sees the
//!   session.
//! - [`with_session`](SessionRegistry::with_session) runs an
//!   authorization check while holding the read lock, so the check can't
//!   interleave with a concurrent revoke.
//!
//! The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use cachegate_transport::ConnectionId;
use parking_lot::RwLock;

use crate::{Session, SessionError};

/// Maps connection ids to their established sessions.
///
/// ## Lifecycle
///
/// ```text
/// handshake Success ──→ register() ──→ [active] ──→ revoke() ──→ [gone]
///                           │                          ↑
///                           └── duplicate → Err        └── SessionGuard::drop
/// ```
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Session>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `session` under its connection id.
    ///
    /// Returns a copy of the registered session.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyAuthenticated`] if the connection
    /// already has a session. The existing session is left untouched.
    pub fn register(&self, session: Session) -> Result<Session, SessionError> {
        let connection = session.connection;
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&connection) {
            return Err(SessionError::AlreadyAuthenticated(connection));
        }
        sessions.insert(connection, session.clone());
        drop(sessions);

        tracing::info!(
            conn_id = %connection,
            principal = %session.principal,
            session_id = %session.session_id,
            "session registered"
        );
        Ok(session)
    }

    /// Returns a copy of the connection's session, if any.
    pub fn lookup(&self, connection: ConnectionId) -> Option<Session> {
        self.sessions.read().get(&connection).cloned()
    }

    /// Runs `f` against the connection's session while holding the read
    /// lock. Returns `None` if the connection has no session.
    ///
    /// Use this for authorization decisions: a concurrent `revoke` waits
    /// until `f` returns, and after that nothing sees the session.
    /// Keep `f` short and non-blocking.
    pub fn with_session<R>(
        &self,
        connection: ConnectionId,
        f: impl FnOnce(&Session) -> R,
    ) -> Option<R> {
        self.sessions.read().get(&connection).map(f)
    }

    /// Whether the connection has a session.
    pub fn contains(&self, connection: ConnectionId) -> bool {
        self.sessions.read().contains_key(&connection)
    }

    /// Removes the connection's session and returns it.
    ///
    /// Idempotent: revoking a connection with no session returns `None`.
    pub fn revoke(&self, connection: ConnectionId) -> Option<Session> {
        let removed = self.sessions.write().remove(&connection);
        if let Some(session) = &removed {
            tracing::info!(
                conn_id = %connection,
                principal = %session.principal,
                session_id = %session.session_id,
                "session revoked"
            );
        }
        removed
    }

    /// Returns a guard that revokes the connection's session when dropped.
    pub fn guard(self: &Arc<Self>, connection: ConnectionId) -> SessionGuard {
        SessionGuard {
            connection,
            registry: Arc::clone(self),
        }
    }

    /// Copies of all active sessions, oldest first.
    pub fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().values().cloned().collect();
        sessions.sort_by_key(|s| (s.created_at, s.connection));
        sessions
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns `true` if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

/// Drop guard that revokes a connection's session.
///
/// The connection task holds one for as long as it serves an
/// authenticated connection. Whether the task returns, errors out, or
/// panics, the session goes away with it.
#[derive(Debug)]
pub struct SessionGuard {
    connection: ConnectionId,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    /// The guarded connection.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.revoke(self.connection);
    }
}

#[cfg(test)]
mod tests {
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use cachegate_protocol::{Attributes, Principal};

    use super::*;

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn session(id: u64, principal: &str) -> Session {
        Session::new(conn(id), Principal::new(principal), Attributes::new())
    }

    // =====================================================================
    // register()
    // =====================================================================

    #[test]
    fn test_register_new_connection_returns_session() {
        let registry = SessionRegistry::new();

        let registered = registry.register(session(1, "alice")).expect("should succeed");

        assert_eq!(registered.connection, conn(1));
        assert_eq!(registered.principal, "alice");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_duplicate_connection_returns_error() {
        let registry = SessionRegistry::new();
        let first = registry.register(session(1, "alice")).unwrap();

        let result = registry.register(session(1, "mallory"));

        assert!(
            matches!(result, Err(SessionError::AlreadyAuthenticated(c)) if c == conn(1)),
            "second register on one connection must fail"
        );
        // The original session survives.
        assert_eq!(registry.lookup(conn(1)), Some(first));
    }

    #[test]
    fn test_register_same_principal_on_two_connections_succeeds() {
        // Sessions are per connection, not per principal.
        let registry = SessionRegistry::new();
        registry.register(session(1, "alice")).unwrap();
        registry.register(session(2, "alice")).unwrap();

        assert_eq!(registry.len(), 2);
    }

    // =====================================================================
    // lookup() / with_session()
    // =====================================================================

    #[test]
    fn test_lookup_unknown_connection_returns_none() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup(conn(99)).is_none());
        assert!(!registry.contains(conn(99)));
    }

    #[test]
    fn test_with_session_runs_closure_on_session() {
        let registry = SessionRegistry::new();
        registry.register(session(1, "alice")).unwrap();

        let name = registry.with_session(conn(1), |s| s.principal.to_string());

        assert_eq!(name.as_deref(), Some("alice"));
        assert_eq!(registry.with_session(conn(2), |_| ()), None);
    }

    #[test]
    fn test_snapshot_returns_all_sessions() {
        let registry = SessionRegistry::new();
        registry.register(session(1, "alice")).unwrap();
        registry.register(session(2, "bob")).unwrap();

        let mut principals: Vec<String> = registry
            .snapshot()
            .into_iter()
            .map(|s| s.principal.to_string())
            .collect();
        principals.sort();

        assert_eq!(principals, vec!["alice", "bob"]);
    }

    // =====================================================================
    // revoke()
    // =====================================================================

    #[test]
    fn test_revoke_removes_session() {
        let registry = SessionRegistry::new();
        registry.register(session(1, "alice")).unwrap();

        let revoked = registry.revoke(conn(1));

        assert_eq!(revoked.map(|s| s.principal), Some(Principal::new("alice")));
        assert!(registry.lookup(conn(1)).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_revoke_twice_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.register(session(1, "alice")).unwrap();

        assert!(registry.revoke(conn(1)).is_some());
        assert!(registry.revoke(conn(1)).is_none());
        assert!(registry.lookup(conn(1)).is_none());
    }

    #[test]
    fn test_revoke_leaves_other_connections_alone() {
        let registry = SessionRegistry::new();
        registry.register(session(1, "alice")).unwrap();
        registry.register(session(2, "bob")).unwrap();

        registry.revoke(conn(1));

        assert_eq!(registry.lookup(conn(2)).unwrap().principal, "bob");
    }

    #[test]
    fn test_register_after_revoke_succeeds() {
        let registry = SessionRegistry::new();
        registry.register(session(1, "alice")).unwrap();
        registry.revoke(conn(1));

        assert!(registry.register(session(1, "alice")).is_ok());
    }

    // =====================================================================
    // SessionGuard
    // =====================================================================

    #[test]
    fn test_guard_drop_revokes_session() {
        let registry = Arc::new(SessionRegistry::new());
        registry.register(session(1, "alice")).unwrap();

        {
            let guard = registry.guard(conn(1));
            assert_eq!(guard.connection(), conn(1));
            assert!(registry.contains(conn(1)));
        }

        assert!(!registry.contains(conn(1)));
    }

    #[test]
    fn test_guard_drop_on_panic_revokes_session() {
        let registry = Arc::new(SessionRegistry::new());
        registry.register(session(1, "alice")).unwrap();

        let cloned = Arc::clone(&registry);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = cloned.guard(conn(1));
            panic!("handler blew up");
        }));

        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    // =====================================================================
    // Concurrency
    // =====================================================================

    #[test]
    fn test_concurrent_register_same_connection_exactly_one_wins() {
        let registry = Arc::new(SessionRegistry::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.register(session(7, &format!("p{i}"))).is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_revoke_and_lookup_never_resurrects() {
        let registry = Arc::new(SessionRegistry::new());
        registry.register(session(1, "alice")).unwrap();

        let revoker = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                registry.revoke(conn(1));
                registry.revoke(conn(1));
            })
        };
        revoker.join().unwrap();

        for _ in 0..100 {
            assert!(registry.lookup(conn(1)).is_none());
        }
    }
}
