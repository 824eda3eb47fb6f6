//! Message records and the append-only message store seam.
//!
//! A message belongs to the conversation of its unordered participant
//! pair: `find_conversation(a, b)` and `find_conversation(b, a)` see the
//! same history, ordered by persistence timestamp ascending.

use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_protocol::{MessageId, UserId};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// A persisted direct message. Immutable after creation except for bulk
/// conversation deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store-assigned identifier.
    pub id: MessageId,
    /// Sending user.
    pub sender: UserId,
    /// Receiving user.
    pub recipient: UserId,
    /// Message body (non-empty).
    pub content: String,
    /// Free-form tag, defaults to `"text"`.
    pub message_type: String,
    /// Server-assigned persistence timestamp. History ordering key.
    pub timestamp: DateTime<Utc>,
}

/// A message about to be persisted. Id and timestamp are store-assigned.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: UserId,
    pub recipient: UserId,
    pub content: String,
    pub message_type: String,
}

/// The append-only message store.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning its id and timestamp.
    ///
    /// This is the durability boundary: once this returns `Ok`, the message
    /// is part of history regardless of live-delivery outcome.
    ///
    /// # Errors
    ///
    /// Returns `EmptyContent` for an empty body, or `Database` when the
    /// store is unavailable.
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError>;

    /// The conversation between two users, timestamp ascending. The pair is
    /// unordered.
    async fn find_conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StoreError>;

    /// Delete every message of the unordered pair's conversation. Returns
    /// the exact count removed, 0 if none existed.
    async fn delete_conversation(&self, a: UserId, b: UserId) -> Result<u64, StoreError>;

    /// Distinct conversation partners of a user, most recent conversation
    /// first.
    async fn conversation_partners(&self, user: UserId) -> Result<Vec<UserId>, StoreError>;
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: String,
    sender: String,
    recipient: String,
    content: String,
    message_type: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let parse = |field: &str, value: &str| {
            Uuid::parse_str(value)
                .map_err(|e| StoreError::Corrupt(format!("message {field} {value}: {e}")))
        };
        Ok(Message {
            id: parse("id", &row.id)?,
            sender: parse("sender", &row.sender)?,
            recipient: parse("recipient", &row.recipient)?,
            content: row.content,
            message_type: row.message_type,
            timestamp: row.timestamp,
        })
    }
}

/// SQLite-backed message store.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        if message.content.is_empty() {
            return Err(StoreError::EmptyContent);
        }

        let id = Uuid::new_v4();
        let timestamp = Utc::now();

        sqlx::query(
            "INSERT INTO messages (id, sender, recipient, content, message_type, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(message.sender.to_string())
        .bind(message.recipient.to_string())
        .bind(&message.content)
        .bind(&message.message_type)
        .bind(timestamp)
        .execute(&self.pool)
        .await?;

        debug!(message = %id, sender = %message.sender, recipient = %message.recipient, "Message appended");

        Ok(Message {
            id,
            sender: message.sender,
            recipient: message.recipient,
            content: message.content,
            message_type: message.message_type,
            timestamp,
        })
    }

    async fn find_conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StoreError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id, sender, recipient, content, message_type, timestamp
             FROM messages
             WHERE (sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1)
             ORDER BY timestamp ASC",
        )
        .bind(a.to_string())
        .bind(b.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Message::try_from).collect()
    }

    async fn delete_conversation(&self, a: UserId, b: UserId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM messages
             WHERE (sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1)",
        )
        .bind(a.to_string())
        .bind(b.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn conversation_partners(&self, user: UserId) -> Result<Vec<UserId>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT CASE WHEN sender = ?1 THEN recipient ELSE sender END AS partner
             FROM messages
             WHERE sender = ?1 OR recipient = ?1
             GROUP BY partner
             ORDER BY MAX(timestamp) DESC",
        )
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(partner,)| {
                Uuid::parse_str(&partner)
                    .map_err(|e| StoreError::Corrupt(format!("partner {partner}: {e}")))
            })
            .collect()
    }
}
