//! Active relay session registry.
//!
//! Tracks live sessions for observability only; the relay itself never
//! reads this. Registered by the WebSocket handler, unregistered on
//! disconnect.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

/// Snapshot of one live relay session.
#[derive(Debug, Clone, Serialize)]
pub struct RelaySessionInfo {
    pub user_pid: String,
    pub companion_code: String,
    pub started_at: DateTime<Utc>,
}

/// Registry of live relay sessions across all users.
#[derive(Debug, Default)]
pub struct RelayRegistry {
    sessions: DashMap<Uuid, RelaySessionInfo>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session, returning the id to unregister with.
    pub fn register(&self, user_pid: &str, companion_code: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            RelaySessionInfo {
                user_pid: user_pid.to_string(),
                companion_code: companion_code.to_string(),
                started_at: Utc::now(),
            },
        );
        id
    }

    pub fn unregister(&self, id: &Uuid) {
        self.sessions.remove(id);
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unregister() {
        let registry = RelayRegistry::new();
        let a = registry.register("u1", "buddy");
        let b = registry.register("u2", "doctor");
        assert_eq!(registry.active_count(), 2);

        registry.unregister(&a);
        assert_eq!(registry.active_count(), 1);
        registry.unregister(&b);
        assert_eq!(registry.active_count(), 0);

        // Unregistering twice is harmless
        registry.unregister(&a);
        assert_eq!(registry.active_count(), 0);
    }
}
