//! Authentication module.
//!
//! Bearer-token auth: a signed JWT resolves to a user identity plus an
//! active, non-expired auth session record. WebSocket upgrades may carry
//! the token as a `token` query parameter instead of a header.

mod claims;
mod middleware;

pub use claims::Claims;
pub use middleware::CurrentUser;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

/// Authentication failure.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no token provided")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token has expired")]
    TokenExpired,

    #[error("session not found")]
    SessionNotFound,

    #[error("session expired")]
    SessionExpired,

    #[error("authentication error: {0}")]
    Internal(String),
}

/// Token signing and verification state, shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: Duration,
}

impl AuthState {
    pub fn new(jwt_secret: &str, session_ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            session_ttl: Duration::hours(session_ttl_hours),
        }
    }

    /// How long issued auth sessions stay valid.
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Sign a token binding a user to an auth session.
    pub fn issue_token(
        &self,
        user_pid: &str,
        session_pid: &str,
        expiry_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_pid.to_string(),
            sid: session_pid.to_string(),
            exp: expiry_at.timestamp(),
            iat: Some(Utc::now().timestamp()),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Internal(err.to_string()))
    }

    /// Verify a token's signature and expiry.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(err.to_string()),
            })
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}
