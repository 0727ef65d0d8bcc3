//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::AuthState;
use crate::chat::ChatStore;
use crate::companion::CompanionRegistry;
use crate::relay::{RelayRegistry, UpstreamConnector};
use crate::user::UserService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// User accounts and auth sessions.
    pub users: UserService,
    /// Chat history store consumed by the relay and the history endpoint.
    pub chat: Arc<dyn ChatStore>,
    /// Companion profile lookup.
    pub companions: Arc<CompanionRegistry>,
    /// Upstream connection factory for relay sessions.
    pub connector: Arc<dyn UpstreamConnector>,
    /// Live relay session registry.
    pub relays: Arc<RelayRegistry>,
    /// Token signing and verification.
    pub auth: AuthState,
}

impl AppState {
    pub fn new(
        users: UserService,
        chat: Arc<dyn ChatStore>,
        companions: Arc<CompanionRegistry>,
        connector: Arc<dyn UpstreamConnector>,
        auth: AuthState,
    ) -> Self {
        Self {
            users,
            chat,
            companions,
            connector,
            relays: Arc::new(RelayRegistry::new()),
            auth,
        }
    }
}
