//! Session registry (§4.3 "Manager").
//!
//! The `Manager` mints new `SessionId`s, owns the map from ID to `Session`,
//! and is the single place that resolves a `ConnectRequest`'s session ID
//! into a live `Session`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ManagerError;
use crate::ids::SessionId;
use crate::session::Session;

/// Registry of live sessions, keyed by `SessionId`.
#[derive(Debug, Default)]
pub struct Manager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl Manager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Mint a brand new session with the given retention limit and
    /// register it under a freshly minted `SessionId`.
    ///
    /// # Panics
    /// Panics if `SessionId::random()` collides with an existing live
    /// session. At 128 bits of randomness this is treated as a fatal
    /// programming-environment error (a broken RNG), not a case to retry.
    pub fn new_session(&self, max_diffs: usize) -> (SessionId, Arc<Session>) {
        let mut sessions = self.sessions.write();
        let id = SessionId::random();
        assert!(
            !sessions.contains_key(&id),
            "SessionId collision on mint — RNG is broken"
        );
        let session = Arc::new(Session::new(max_diffs));
        sessions.insert(id, Arc::clone(&session));
        (id, session)
    }

    /// Look up a session by ID.
    ///
    /// # Errors
    /// Returns `ManagerError::NotFound` if no session with that ID is
    /// currently registered (the resolved Open Question — see DESIGN.md —
    /// treats this as fatal to the requesting connection, not as "start a
    /// fresh session").
    pub fn lookup(&self, id: SessionId) -> Result<Arc<Session>, ManagerError> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(ManagerError::NotFound(id))
    }

    /// Propagate a new diff retention limit to every currently live
    /// session (newly minted sessions use whatever limit the caller of
    /// `new_session` passes, typically `DeskmuxConfig::default_retention_limit`).
    pub fn set_diff_retention_limit(&self, max_diffs: usize) {
        for session in self.sessions.read().values() {
            session.set_max_diffs(max_diffs);
        }
    }

    /// Close and deregister a session. Idempotent: closing an unknown or
    /// already-closed session is a no-op.
    pub fn close(&self, id: SessionId) {
        if let Some(session) = self.sessions.write().remove(&id) {
            session.close();
        }
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Snapshot of every currently live `(SessionId, Session)` pair, for
    /// fanning a desktop-originated frame (a published `BufferDelta`, a
    /// tree-changed `TreeSnapshot`, a `StateUpdate`) out to every attached
    /// connection rather than just the one that triggered it.
    #[must_use]
    pub fn live_sessions(&self) -> Vec<(SessionId, Arc<Session>)> {
        self.sessions
            .read()
            .iter()
            .map(|(id, session)| (*id, Arc::clone(session)))
            .collect()
    }
}
