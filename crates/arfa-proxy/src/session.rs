//! Active session identity.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

/// Identity stamped onto every entry logged while it is active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentity {
    pub session_id: String,
    /// Agent identifier, e.g. `claude-code`.
    pub client_name: String,
    pub client_version: String,
}

impl SessionIdentity {
    /// Creates a session identity.
    pub fn new(
        session_id: impl Into<String>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            client_name: client_name.into(),
            client_version: client_version.into(),
        }
    }
}

/// Shared holder of the current [`SessionIdentity`].
///
/// The identity is replaced and read as a whole, so a reader never observes
/// fields from two different sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    current: Arc<RwLock<Arc<SessionIdentity>>>,
}

impl SessionState {
    /// Creates state holding `identity`.
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(identity))),
        }
    }

    /// Returns a snapshot of the current identity.
    pub fn get(&self) -> Arc<SessionIdentity> {
        Arc::clone(&self.current.read())
    }

    /// Replaces the identity, returning the previous one.
    pub fn set(&self, identity: SessionIdentity) -> Arc<SessionIdentity> {
        std::mem::replace(&mut *self.current.write(), Arc::new(identity))
    }
}

/// Request and byte counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionMetrics {
    pub session_id: String,
    pub request_count: u64,
    /// Request body bytes relayed upstream.
    pub bytes_sent: u64,
    /// Response body bytes relayed back, as received on the wire.
    pub bytes_received: u64,
}

impl SessionMetrics {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            ..Default::default()
        }
    }
}

/// Shared counters for the active session.
///
/// Counters restart from zero when traffic arrives for a different session.
#[derive(Debug, Clone, Default)]
pub struct MetricsState {
    current: Arc<Mutex<SessionMetrics>>,
}

impl MetricsState {
    /// Counts one request of `bytes` and returns the updated counters.
    pub fn record_request(&self, session_id: &str, bytes: usize) -> SessionMetrics {
        self.update(session_id, |m| {
            m.request_count += 1;
            m.bytes_sent += bytes as u64;
        })
    }

    /// Counts a response of `bytes` and returns the updated counters.
    pub fn record_response(&self, session_id: &str, bytes: usize) -> SessionMetrics {
        self.update(session_id, |m| m.bytes_received += bytes as u64)
    }

    /// Returns the counters for `session_id`, zero if nothing was recorded.
    pub fn get(&self, session_id: &str) -> SessionMetrics {
        let current = self.current.lock();
        if current.session_id == session_id {
            current.clone()
        } else {
            SessionMetrics::new(session_id)
        }
    }

    fn update(&self, session_id: &str, f: impl FnOnce(&mut SessionMetrics)) -> SessionMetrics {
        let mut current = self.current.lock();
        if current.session_id != session_id {
            *current = SessionMetrics::new(session_id);
        }
        f(&mut *current);
        current.clone()
    }
}
