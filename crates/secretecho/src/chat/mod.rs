//! Chat history persistence.
//!
//! The relay consumes the [`ChatStore`] trait and never mutates or deletes
//! stored messages; it only reads full histories and appends new turns.
//! Appends are at-least-once: the store does not retry internally and no
//! idempotency key exists, so caller-level retries may duplicate a turn.

mod store;

pub use store::SqliteChatStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Who produced a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Companion,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Companion => write!(f, "companion"),
        }
    }
}

impl std::str::FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Sender::User),
            "companion" => Ok(Sender::Companion),
            _ => Err(format!("unknown sender: {}", s)),
        }
    }
}

/// A stored conversation turn. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

/// A turn to be appended; the store assigns the timestamp.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub content: String,
    pub sender: Sender,
}

impl NewChatMessage {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender,
        }
    }
}

/// Chat store failure.
#[derive(Debug, Error)]
pub enum ChatStoreError {
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for ChatStoreError {
    fn from(err: sqlx::Error) -> Self {
        ChatStoreError::Database(err.to_string())
    }
}

/// Persistence gateway for conversation turns.
///
/// Shared by all relay sessions; implementations must support concurrent
/// access for the same or different users. Each call is an independent
/// operation, no cross-call transactions are required.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Fetch the full stored history for one user/companion pair,
    /// oldest first.
    async fn history(
        &self,
        user_pid: &str,
        companion_code: &str,
    ) -> Result<Vec<ChatMessage>, ChatStoreError>;

    /// Append one turn to the history.
    async fn append_message(
        &self,
        user_pid: &str,
        companion_code: &str,
        message: NewChatMessage,
    ) -> Result<(), ChatStoreError>;
}
