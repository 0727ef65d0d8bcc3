//! Repositories for users and auth sessions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{AuthSession, User};

/// Data access for the `users` table.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new user with a freshly hashed password.
    pub async fn create(
        &self,
        email: &str,
        password_hash: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<User> {
        let user_pid = nanoid::nanoid!();
        let now = Utc::now();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO users (user_pid, email, password_hash, first_name, last_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&user_pid)
        .bind(email)
        .bind(password_hash)
        .bind(first_name)
        .bind(last_name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("inserting user")?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("fetching user")
    }

    pub async fn get_by_pid(&self, user_pid: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_pid = ?")
            .bind(user_pid)
            .fetch_optional(&self.pool)
            .await
            .context("fetching user by pid")
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("fetching user by email")
    }

    pub async fn is_email_available(&self, email: &str) -> Result<bool> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .context("checking email availability")?;
        Ok(count == 0)
    }
}

/// Data access for the `auth_sessions` table.
#[derive(Debug, Clone)]
pub struct AuthSessionRepository {
    pool: SqlitePool,
}

impl AuthSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a session for a user, valid until `expiry_at`.
    pub async fn create(&self, user_pid: &str, expiry_at: DateTime<Utc>) -> Result<AuthSession> {
        let session_pid = nanoid::nanoid!();
        let now = Utc::now();

        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO auth_sessions (session_pid, user_pid, expiry_at, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&session_pid)
        .bind(user_pid)
        .bind(expiry_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("inserting auth session")?;

        sqlx::query_as::<_, AuthSession>("SELECT * FROM auth_sessions WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("fetching auth session")
    }

    pub async fn get_by_pid(&self, session_pid: &str) -> Result<Option<AuthSession>> {
        sqlx::query_as::<_, AuthSession>("SELECT * FROM auth_sessions WHERE session_pid = ?")
            .bind(session_pid)
            .fetch_optional(&self.pool)
            .await
            .context("fetching auth session by pid")
    }

    /// Soft-delete a session (logout).
    pub async fn soft_delete(&self, session_pid: &str) -> Result<()> {
        sqlx::query("UPDATE auth_sessions SET deleted_at = ? WHERE session_pid = ?")
            .bind(Utc::now())
            .bind(session_pid)
            .execute(&self.pool)
            .await
            .context("soft-deleting auth session")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::Duration;

    async fn setup() -> (UserRepository, AuthSessionRepository) {
        let db = Database::in_memory().await.unwrap();
        (
            UserRepository::new(db.pool().clone()),
            AuthSessionRepository::new(db.pool().clone()),
        )
    }

    #[tokio::test]
    async fn test_user_crud() {
        let (users, _) = setup().await;

        let user = users
            .create("jane@example.com", "hash", "Jane", "Doe")
            .await
            .unwrap();
        assert_eq!(user.email, "jane@example.com");
        assert!(!user.user_pid.is_empty());

        let by_pid = users.get_by_pid(&user.user_pid).await.unwrap().unwrap();
        assert_eq!(by_pid.id, user.id);

        let by_email = users.get_by_email("jane@example.com").await.unwrap();
        assert!(by_email.is_some());

        assert!(!users.is_email_available("jane@example.com").await.unwrap());
        assert!(users.is_email_available("other@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let (users, _) = setup().await;

        users
            .create("jane@example.com", "hash", "Jane", "Doe")
            .await
            .unwrap();
        let result = users.create("jane@example.com", "hash", "Other", "Jane").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (users, sessions) = setup().await;
        let user = users
            .create("jane@example.com", "hash", "Jane", "Doe")
            .await
            .unwrap();

        let expiry = Utc::now() + Duration::hours(24);
        let session = sessions.create(&user.user_pid, expiry).await.unwrap();
        assert!(session.deleted_at.is_none());

        let fetched = sessions
            .get_by_pid(&session.session_pid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.user_pid, user.user_pid);

        sessions.soft_delete(&session.session_pid).await.unwrap();
        let deleted = sessions
            .get_by_pid(&session.session_pid)
            .await
            .unwrap()
            .unwrap();
        assert!(deleted.deleted_at.is_some());
    }
}
