//! SQLite-backed chat store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{ChatMessage, ChatStore, ChatStoreError, NewChatMessage, Sender};

/// Production [`ChatStore`] over the shared connection pool.
#[derive(Debug, Clone)]
pub struct SqliteChatStore {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct ChatMessageRow {
    content: String,
    sender: String,
    timestamp: DateTime<Utc>,
}

impl ChatMessageRow {
    fn into_message(self) -> Result<ChatMessage, ChatStoreError> {
        let sender: Sender = self
            .sender
            .parse()
            .map_err(ChatStoreError::Database)?;
        Ok(ChatMessage {
            content: self.content,
            sender,
            timestamp: self.timestamp,
        })
    }
}

impl SqliteChatStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn history(
        &self,
        user_pid: &str,
        companion_code: &str,
    ) -> Result<Vec<ChatMessage>, ChatStoreError> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(
            r#"
            SELECT content, sender, timestamp
            FROM chat_messages
            WHERE user_pid = ? AND companion_code = ?
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(user_pid)
        .bind(companion_code)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ChatMessageRow::into_message).collect()
    }

    async fn append_message(
        &self,
        user_pid: &str,
        companion_code: &str,
        message: NewChatMessage,
    ) -> Result<(), ChatStoreError> {
        let timestamp = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO chat_messages (user_pid, companion_code, content, sender, timestamp)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_pid)
        .bind(companion_code)
        .bind(&message.content)
        .bind(message.sender.to_string())
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> SqliteChatStore {
        let db = Database::in_memory().await.unwrap();
        SqliteChatStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_append_and_history_order() {
        let store = setup().await;

        store
            .append_message("u1", "buddy", NewChatMessage::new(Sender::User, "hello"))
            .await
            .unwrap();
        store
            .append_message(
                "u1",
                "buddy",
                NewChatMessage::new(Sender::Companion, "hey there"),
            )
            .await
            .unwrap();

        let history = store.history("u1", "buddy").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[0].sender, Sender::User);
        assert_eq!(history[1].content, "hey there");
        assert_eq!(history[1].sender, Sender::Companion);
    }

    #[tokio::test]
    async fn test_history_scoped_per_conversation() {
        let store = setup().await;

        store
            .append_message("u1", "buddy", NewChatMessage::new(Sender::User, "a"))
            .await
            .unwrap();
        store
            .append_message("u1", "doctor", NewChatMessage::new(Sender::User, "b"))
            .await
            .unwrap();
        store
            .append_message("u2", "buddy", NewChatMessage::new(Sender::User, "c"))
            .await
            .unwrap();

        let history = store.history("u1", "buddy").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "a");
    }

    #[tokio::test]
    async fn test_empty_history() {
        let store = setup().await;
        let history = store.history("nobody", "buddy").await.unwrap();
        assert!(history.is_empty());
    }
}
