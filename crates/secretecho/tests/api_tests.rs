//! REST API integration tests.

mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use secretecho::api::{self, AppState};
use secretecho::chat::{NewChatMessage, Sender};

use common::{signup_user, test_state};

async fn test_server() -> (TestServer, AppState) {
    let state = test_state().await;
    let server = TestServer::new(api::create_router(state.clone())).unwrap();
    (server, state)
}

fn signup_body(email: &str) -> Value {
    json!({
        "email": email,
        "password": "hunter22",
        "first_name": "Jane",
        "last_name": "Doe",
    })
}

#[tokio::test]
async fn test_signup_returns_token() {
    let (server, _state) = test_server().await;

    let response = server
        .post("/api/v1/auth/signup")
        .json(&signup_body("jane@example.com"))
        .await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    assert!(body["token"].as_str().unwrap().contains('.'));
    assert_eq!(body["user"]["email"], "jane@example.com");
    // Sensitive fields never leave the server
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
async fn test_signup_validation() {
    let (server, _state) = test_server().await;

    let bad_email = server
        .post("/api/v1/auth/signup")
        .json(&json!({
            "email": "not-an-email",
            "password": "hunter22",
            "first_name": "Jane",
            "last_name": "Doe",
        }))
        .await;
    bad_email.assert_status(StatusCode::BAD_REQUEST);

    let short_password = server
        .post("/api/v1/auth/signup")
        .json(&json!({
            "email": "jane@example.com",
            "password": "abc",
            "first_name": "Jane",
            "last_name": "Doe",
        }))
        .await;
    short_password.assert_status(StatusCode::BAD_REQUEST);

    // Duplicate email conflicts
    server
        .post("/api/v1/auth/signup")
        .json(&signup_body("jane@example.com"))
        .await
        .assert_status(StatusCode::OK);
    let duplicate = server
        .post("/api/v1/auth/signup")
        .json(&signup_body("jane@example.com"))
        .await;
    duplicate.assert_status(StatusCode::CONFLICT);

    let body: Value = duplicate.json();
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_login_flow() {
    let (server, _state) = test_server().await;

    server
        .post("/api/v1/auth/signup")
        .json(&signup_body("jane@example.com"))
        .await
        .assert_status(StatusCode::OK);

    let ok = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "jane@example.com", "password": "hunter22" }))
        .await;
    ok.assert_status(StatusCode::OK);
    let body: Value = ok.json();
    assert!(body["token"].as_str().is_some());

    let wrong = server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "jane@example.com", "password": "wrong" }))
        .await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let (server, _state) = test_server().await;

    server
        .get("/api/v1/companions")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    server
        .get("/api/v1/companions/buddy/history")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let garbage = server
        .get("/api/v1/companions")
        .authorization_bearer("not.a.token")
        .await;
    garbage.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_companions() {
    let (server, state) = test_server().await;
    let token = signup_user(&state, "jane@example.com").await;

    let response = server
        .get("/api/v1/companions")
        .authorization_bearer(&token)
        .await;
    response.assert_status(StatusCode::OK);

    let companions: Value = response.json();
    let codes: Vec<&str> = companions
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["code"].as_str().unwrap())
        .collect();
    for code in ["doctor", "mind", "fit", "buddy", "chef"] {
        assert!(codes.contains(&code), "missing companion {}", code);
    }

    // Prompts are not exposed through the listing
    assert!(companions[0].get("system_prompt").is_none());
}

#[tokio::test]
async fn test_chat_history_endpoint() {
    let (server, state) = test_server().await;
    let token = signup_user(&state, "jane@example.com").await;

    let empty = server
        .get("/api/v1/companions/buddy/history")
        .authorization_bearer(&token)
        .await;
    empty.assert_status(StatusCode::OK);
    assert_eq!(empty.json::<Value>().as_array().unwrap().len(), 0);

    // Seed a conversation for this user
    let claims_user = state
        .auth
        .verify_token(&token)
        .unwrap()
        .sub;
    state
        .chat
        .append_message(&claims_user, "buddy", NewChatMessage::new(Sender::User, "hi"))
        .await
        .unwrap();
    state
        .chat
        .append_message(
            &claims_user,
            "buddy",
            NewChatMessage::new(Sender::Companion, "hello!"),
        )
        .await
        .unwrap();

    let history = server
        .get("/api/v1/companions/buddy/history")
        .authorization_bearer(&token)
        .await;
    history.assert_status(StatusCode::OK);
    let body: Value = history.json();
    assert_eq!(body[0]["content"], "hi");
    assert_eq!(body[0]["sender"], "user");
    assert_eq!(body[1]["content"], "hello!");
    assert_eq!(body[1]["sender"], "companion");

    // Unknown companion
    server
        .get("/api/v1/companions/ghost/history")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logout_invalidates_token() {
    let (server, state) = test_server().await;
    let token = signup_user(&state, "jane@example.com").await;

    server
        .post("/api/v1/auth/logout")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::OK);

    // The same token no longer authorizes requests
    server
        .get("/api/v1/companions")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_is_public() {
    let (server, _state) = test_server().await;

    let response = server.get("/api/v1/health").await;
    response.assert_status(StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_relay_sessions"], 0);
}
