//! Test utilities and common setup.

use std::net::SocketAddr;
use std::sync::Arc;

use secretecho::api::{self, AppState};
use secretecho::auth::AuthState;
use secretecho::chat::SqliteChatStore;
use secretecho::companion::CompanionRegistry;
use secretecho::db::Database;
use secretecho::relay::{GeminiConfig, GeminiConnector, UpstreamConnector};
use secretecho::user::{AuthSessionRepository, SignupRequest, UserRepository, UserService};

pub const TEST_JWT_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";

/// Build application state around the given upstream connector.
pub async fn test_state_with_connector(connector: Arc<dyn UpstreamConnector>) -> AppState {
    // In-memory database for tests
    let db = Database::in_memory().await.unwrap();

    let auth = AuthState::new(TEST_JWT_SECRET, 24);
    let users = UserService::new(
        UserRepository::new(db.pool().clone()),
        AuthSessionRepository::new(db.pool().clone()),
        auth.clone(),
    );
    let chat = Arc::new(SqliteChatStore::new(db.pool().clone()));

    AppState::new(
        users,
        chat,
        Arc::new(CompanionRegistry::builtin()),
        connector,
        auth,
    )
}

/// State for REST-only tests. The connector points at a closed port and is
/// never exercised.
pub async fn test_state() -> AppState {
    let connector = GeminiConnector::new(GeminiConfig {
        ws_url: "ws://127.0.0.1:1".to_string(),
        api_key: "test-key".to_string(),
        ..GeminiConfig::default()
    });
    test_state_with_connector(Arc::new(connector)).await
}

/// Serve the app on an ephemeral port and return its address.
pub async fn spawn_app(state: AppState) -> SocketAddr {
    let router = api::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Create a user and return a valid bearer token.
pub async fn signup_user(state: &AppState, email: &str) -> String {
    state
        .users
        .signup(SignupRequest {
            email: email.to_string(),
            password: "hunter22".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
        })
        .await
        .unwrap()
        .token
}
