//! In-memory store backend.
//!
//! Used by tests and ephemeral development runs. Semantics mirror the
//! SQLite backend exactly, including the unordered-pair conversation rule.

use crate::message::{Message, MessageStore, NewMessage};
use crate::user::{ProfileUpdate, User, UserStore};
use crate::StoreError;
use async_trait::async_trait;
use bcrypt::{hash, DEFAULT_COST};
use chrono::Utc;
use courier_protocol::UserId;
use tokio::sync::RwLock;
use uuid::Uuid;

fn same_pair(message: &Message, a: UserId, b: UserId) -> bool {
    (message.sender == a && message.recipient == b)
        || (message.sender == b && message.recipient == a)
}

/// In-memory user store.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pre-built record directly, bypassing hashing. Test helper.
    pub async fn insert(&self, user: User) {
        self.users.write().await.push(user);
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let password_hash = hash(password, DEFAULT_COST)?;
        let mut users = self.users.write().await;

        if users.iter().any(|u| u.email == email) {
            return Err(StoreError::DuplicateEmail);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash,
            first_name: None,
            last_name: None,
            avatar_color: None,
            profile_complete: false,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn search(&self, term: &str) -> Result<Vec<User>, StoreError> {
        let term = term.to_lowercase();
        let matches = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&term))
        };

        Ok(self
            .users
            .read()
            .await
            .iter()
            .filter(|u| {
                u.email.to_lowercase().contains(&term)
                    || matches(&u.first_name)
                    || matches(&u.last_name)
            })
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.users.read().await.clone())
    }

    async fn update_profile(
        &self,
        id: UserId,
        update: ProfileUpdate,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };

        user.first_name = Some(update.first_name);
        user.last_name = Some(update.last_name);
        if update.avatar_color.is_some() {
            user.avatar_color = update.avatar_color;
        }
        user.profile_complete = true;
        Ok(Some(user.clone()))
    }
}

/// In-memory message store.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<Message>>,
}

impl MemoryMessageStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: NewMessage) -> Result<Message, StoreError> {
        if message.content.is_empty() {
            return Err(StoreError::EmptyContent);
        }

        let message = Message {
            id: Uuid::new_v4(),
            sender: message.sender,
            recipient: message.recipient,
            content: message.content,
            message_type: message.message_type,
            timestamp: Utc::now(),
        };
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn find_conversation(&self, a: UserId, b: UserId) -> Result<Vec<Message>, StoreError> {
        let mut history: Vec<Message> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| same_pair(m, a, b))
            .cloned()
            .collect();
        history.sort_by_key(|m| m.timestamp);
        Ok(history)
    }

    async fn delete_conversation(&self, a: UserId, b: UserId) -> Result<u64, StoreError> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|m| !same_pair(m, a, b));
        Ok((before - messages.len()) as u64)
    }

    async fn conversation_partners(&self, user: UserId) -> Result<Vec<UserId>, StoreError> {
        let messages = self.messages.read().await;
        let mut latest: Vec<(UserId, chrono::DateTime<Utc>)> = Vec::new();

        for message in messages.iter() {
            let partner = if message.sender == user {
                message.recipient
            } else if message.recipient == user {
                message.sender
            } else {
                continue;
            };

            match latest.iter_mut().find(|(p, _)| *p == partner) {
                Some(entry) if entry.1 < message.timestamp => entry.1 = message.timestamp,
                Some(_) => {}
                None => latest.push((partner, message.timestamp)),
            }
        }

        latest.sort_by(|x, y| y.1.cmp(&x.1));
        Ok(latest.into_iter().map(|(p, _)| p).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_matches_unordered_pair_rule() {
        let store = MemoryMessageStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store
            .append(NewMessage {
                sender: a,
                recipient: b,
                content: "one".to_string(),
                message_type: "text".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(
            store.find_conversation(a, b).await.unwrap(),
            store.find_conversation(b, a).await.unwrap()
        );
        assert_eq!(store.delete_conversation(b, a).await.unwrap(), 1);
        assert_eq!(store.delete_conversation(a, b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_duplicate_email() {
        let store = MemoryUserStore::new();
        store.create("alice@example.com", "pw").await.unwrap();
        assert!(matches!(
            store.create("alice@example.com", "pw").await,
            Err(StoreError::DuplicateEmail)
        ));
    }
}
