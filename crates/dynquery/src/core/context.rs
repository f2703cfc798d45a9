use std::fmt;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::registry::ConnectionHandle;

/// Identifies one calling scope (a client session or a single request).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        SessionId(id.into())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        SessionId::new("default")
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tracks the "current" connection of every calling scope.
///
/// Replacing a scope's handle never closes the previous one; it stays cached in the registry.
#[derive(Debug, Default)]
pub struct ContextRouter {
    current: DashMap<SessionId, ConnectionHandle>,
}

impl ContextRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_current(&self, session: &SessionId, handle: ConnectionHandle) {
        debug!(%session, fingerprint=%handle.fingerprint(), "active connection set");
        self.current.insert(session.clone(), handle);
    }

    pub fn current(&self, session: &SessionId) -> Option<ConnectionHandle> {
        self.current.get(session).map(|h| h.clone())
    }

    pub fn release(&self, session: &SessionId) -> Option<ConnectionHandle> {
        self.current.remove(session).map(|(_, h)| h)
    }

    pub fn sessions(&self) -> usize {
        self.current.len()
    }
}
