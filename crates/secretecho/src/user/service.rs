//! User service for signup, login and session issuance.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use super::models::{AuthSession, SignupRequest, User};
use super::repository::{AuthSessionRepository, UserRepository};
use crate::auth::AuthState;

/// A signed session token plus the user it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user: User,
}

/// Service for account management and credential verification.
#[derive(Debug, Clone)]
pub struct UserService {
    users: UserRepository,
    sessions: AuthSessionRepository,
    auth: AuthState,
}

impl UserService {
    pub fn new(users: UserRepository, sessions: AuthSessionRepository, auth: AuthState) -> Self {
        Self {
            users,
            sessions,
            auth,
        }
    }

    /// Register a new user and log them straight in.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn signup(&self, request: SignupRequest) -> Result<TokenResponse> {
        if !is_valid_email(&request.email) {
            bail!("Invalid email format.");
        }
        if request.password.len() < 6 {
            bail!("Password must be at least 6 characters.");
        }
        if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
            bail!("Invalid name: first and last name are required.");
        }
        if !self.users.is_email_available(&request.email).await? {
            bail!("Email '{}' is already registered.", request.email);
        }

        let password_hash = hash_password(&request.password)?;
        let user = self
            .users
            .create(
                &request.email,
                &password_hash,
                request.first_name.trim(),
                request.last_name.trim(),
            )
            .await?;
        info!(user_pid = %user.user_pid, "Created new user");

        self.issue_session(user).await
    }

    /// Verify credentials and issue a fresh session token.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<TokenResponse>> {
        let user = match self.users.get_by_email(email).await? {
            Some(user) if verify_password(password, &user.password_hash)? => user,
            _ => return Ok(None),
        };

        info!(user_pid = %user.user_pid, "User logged in");
        self.issue_session(user).await.map(Some)
    }

    /// Invalidate one auth session.
    #[instrument(skip(self))]
    pub async fn logout(&self, session_pid: &str) -> Result<()> {
        self.sessions.soft_delete(session_pid).await?;
        info!(session_pid = %session_pid, "Session invalidated");
        Ok(())
    }

    /// Look up an auth session record (used by the auth middleware).
    pub async fn session_by_pid(&self, session_pid: &str) -> Result<Option<AuthSession>> {
        self.sessions.get_by_pid(session_pid).await
    }

    pub async fn user_by_pid(&self, user_pid: &str) -> Result<Option<User>> {
        self.users.get_by_pid(user_pid).await
    }

    async fn issue_session(&self, user: User) -> Result<TokenResponse> {
        let expiry_at = Utc::now() + self.auth.session_ttl();
        let session = self.sessions.create(&user.user_pid, expiry_at).await?;
        let token = self
            .auth
            .issue_token(&user.user_pid, &session.session_pid, expiry_at)
            .context("signing session token")?;

        Ok(TokenResponse { token, user })
    }
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }
    !parts[0].is_empty() && parts[1].contains('.')
}

/// Hash a password using bcrypt.
fn hash_password(password: &str) -> Result<String> {
    // Use a lower cost factor for development speed
    let cost = if cfg!(debug_assertions) { 4 } else { 10 };
    bcrypt::hash(password, cost).context("Failed to hash password")
}

/// Verify a password against a bcrypt hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("Failed to verify password")
}
