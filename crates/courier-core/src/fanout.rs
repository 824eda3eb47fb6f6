//! Message fan-out pipeline.
//!
//! Consumes an inbound send event from an authenticated connection,
//! resolves both participants, persists the message, and pushes it to
//! whichever of {sender, recipient} currently own a live connection.
//!
//! The `append` call is the durability boundary: it completes before any
//! presence lookup, and a failed push neither rolls it back nor retries.

use crate::presence::PresenceRegistry;
use courier_protocol::{ServerEvent, UserId};
use courier_store::{Message, MessageStore, NewMessage, StoreError, User, UserStore};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Fan-out errors. Each aborts the single send operation; none affect the
/// registry or other connections.
#[derive(Debug, Error)]
pub enum FanoutError {
    /// Sender or recipient does not resolve to a user record. Nothing is
    /// written, nothing is pushed.
    #[error("unknown participant: {0}")]
    UnresolvedParticipant(UserId),

    /// The store rejected the message or is unavailable. The pipeline
    /// aborts before any push.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of a dispatched send event.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    /// The persisted message.
    pub message: Message,
    /// Live pushes that reached a connection queue (0, 1, or 2).
    pub deliveries: usize,
}

/// The message fan-out pipeline.
///
/// Constructed once at startup over the injected stores and registry;
/// `dispatch` may run concurrently from any number of connection tasks.
pub struct FanoutPipeline {
    users: Arc<dyn UserStore>,
    messages: Arc<dyn MessageStore>,
    presence: Arc<PresenceRegistry>,
}

impl FanoutPipeline {
    /// Create a new pipeline.
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        messages: Arc<dyn MessageStore>,
        presence: Arc<PresenceRegistry>,
    ) -> Self {
        Self {
            users,
            messages,
            presence,
        }
    }

    /// Handle one inbound send event from `sender`.
    ///
    /// # Errors
    ///
    /// Returns an error if either participant is unknown or persistence
    /// fails; in both cases nothing was written and nothing was pushed.
    pub async fn dispatch(
        &self,
        sender: UserId,
        recipient: UserId,
        content: String,
        message_type: String,
    ) -> Result<DispatchReceipt, FanoutError> {
        let sender_record = self.resolve(sender).await?;
        let recipient_record = self.resolve(recipient).await?;

        // Durability boundary. The registry is untouched until this
        // returns, and persistence never waits on a presence lock.
        let message = self
            .messages
            .append(NewMessage {
                sender,
                recipient,
                content,
                message_type,
            })
            .await?;

        let payload = ServerEvent::ReceiveMessage {
            id: message.id,
            sender: sender_record.profile(),
            recipient: recipient_record.profile(),
            content: message.content.clone(),
            message_type: message.message_type.clone(),
            timestamp: message.timestamp,
        };

        let mut deliveries = 0;
        deliveries += self.push_to(sender, payload.clone());
        // A self-message collapses to a single delivery.
        if recipient != sender {
            deliveries += self.push_to(recipient, payload);
        }

        debug!(
            message = %message.id,
            sender = %sender,
            recipient = %recipient,
            deliveries,
            "Message dispatched"
        );

        Ok(DispatchReceipt {
            message,
            deliveries,
        })
    }

    async fn resolve(&self, user: UserId) -> Result<User, FanoutError> {
        self.users
            .find_by_id(user)
            .await?
            .ok_or(FanoutError::UnresolvedParticipant(user))
    }

    /// Best-effort push. Absence of a live connection is not an error; a
    /// closed one is logged and swallowed.
    fn push_to(&self, user: UserId, payload: ServerEvent) -> usize {
        let Some(handle) = self.presence.lookup(user) else {
            return 0;
        };

        match handle.push(payload) {
            Ok(()) => 1,
            Err(e) => {
                warn!(user = %user, connection = %handle.id(), error = %e, "Live push failed");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::ClientHandle;
    use async_trait::async_trait;
    use courier_store::{MemoryMessageStore, MemoryUserStore};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    struct Fixture {
        users: Arc<MemoryUserStore>,
        messages: Arc<MemoryMessageStore>,
        presence: Arc<PresenceRegistry>,
        pipeline: FanoutPipeline,
    }

    fn fixture() -> Fixture {
        let users = Arc::new(MemoryUserStore::new());
        let messages = Arc::new(MemoryMessageStore::new());
        let presence = Arc::new(PresenceRegistry::new());
        let pipeline = FanoutPipeline::new(
            users.clone() as Arc<dyn UserStore>,
            messages.clone() as Arc<dyn MessageStore>,
            presence.clone(),
        );
        Fixture {
            users,
            messages,
            presence,
            pipeline,
        }
    }

    async fn seed_user(users: &MemoryUserStore, email: &str) -> UserId {
        let id = Uuid::new_v4();
        users
            .insert(courier_store::User {
                id,
                email: email.to_string(),
                password_hash: "x".to_string(),
                first_name: None,
                last_name: None,
                avatar_color: None,
                profile_complete: false,
            })
            .await;
        id
    }

    fn connect(presence: &PresenceRegistry, user: UserId) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (handle, rx) = ClientHandle::channel();
        presence.register(user, handle);
        rx
    }

    #[tokio::test]
    async fn test_persist_then_push_to_live_recipient_only() {
        let fx = fixture();
        let alice = seed_user(&fx.users, "alice@example.com").await;
        let bob = seed_user(&fx.users, "bob@example.com").await;

        // Bob is connected, Alice is not.
        let mut bob_rx = connect(&fx.presence, bob);

        let receipt = fx
            .pipeline
            .dispatch(alice, bob, "hi".to_string(), "text".to_string())
            .await
            .unwrap();

        assert_eq!(receipt.deliveries, 1);

        match bob_rx.try_recv().unwrap() {
            ServerEvent::ReceiveMessage {
                id,
                sender,
                recipient,
                content,
                ..
            } => {
                assert_eq!(id, receipt.message.id);
                assert_eq!(sender.email, "alice@example.com");
                assert_eq!(recipient.email, "bob@example.com");
                assert_eq!(content, "hi");
            }
            other => panic!("Expected ReceiveMessage, got {other:?}"),
        }
        assert!(bob_rx.try_recv().is_err());

        // Durable regardless of who was live.
        let history = fx.messages.find_conversation(alice, bob).await.unwrap();
        assert_eq!(history, vec![receipt.message]);
    }

    #[tokio::test]
    async fn test_both_offline_still_durable() {
        let fx = fixture();
        let alice = seed_user(&fx.users, "alice@example.com").await;
        let bob = seed_user(&fx.users, "bob@example.com").await;

        fx.pipeline
            .dispatch(alice, bob, "earlier".to_string(), "text".to_string())
            .await
            .unwrap();
        let receipt = fx
            .pipeline
            .dispatch(alice, bob, "later".to_string(), "text".to_string())
            .await
            .unwrap();

        assert_eq!(receipt.deliveries, 0);

        let history = fx.messages.find_conversation(bob, alice).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().unwrap().content, "later");
    }

    #[tokio::test]
    async fn test_sender_echo_when_both_live() {
        let fx = fixture();
        let alice = seed_user(&fx.users, "alice@example.com").await;
        let bob = seed_user(&fx.users, "bob@example.com").await;

        let mut alice_rx = connect(&fx.presence, alice);
        let mut bob_rx = connect(&fx.presence, bob);

        let receipt = fx
            .pipeline
            .dispatch(alice, bob, "hi".to_string(), "text".to_string())
            .await
            .unwrap();

        assert_eq!(receipt.deliveries, 2);
        assert!(alice_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unresolved_recipient_writes_nothing() {
        let fx = fixture();
        let alice = seed_user(&fx.users, "alice@example.com").await;
        let ghost = Uuid::new_v4();
        let mut alice_rx = connect(&fx.presence, alice);

        match fx
            .pipeline
            .dispatch(alice, ghost, "hello?".to_string(), "text".to_string())
            .await
        {
            Err(FanoutError::UnresolvedParticipant(id)) => assert_eq!(id, ghost),
            other => panic!("Expected UnresolvedParticipant, got {other:?}"),
        }

        // Fail closed: no partial state, not even the sender echo.
        assert!(alice_rx.try_recv().is_err());
        assert!(fx
            .messages
            .find_conversation(alice, ghost)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_empty_content_rejected_before_persistence() {
        let fx = fixture();
        let alice = seed_user(&fx.users, "alice@example.com").await;
        let bob = seed_user(&fx.users, "bob@example.com").await;

        assert!(matches!(
            fx.pipeline
                .dispatch(alice, bob, String::new(), "text".to_string())
                .await,
            Err(FanoutError::Store(StoreError::EmptyContent))
        ));
        assert!(fx
            .messages
            .find_conversation(alice, bob)
            .await
            .unwrap()
            .is_empty());
    }

    struct UnavailableMessageStore;

    #[async_trait]
    impl MessageStore for UnavailableMessageStore {
        async fn append(&self, _message: NewMessage) -> Result<Message, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolClosed))
        }

        async fn find_conversation(
            &self,
            _a: UserId,
            _b: UserId,
        ) -> Result<Vec<Message>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_conversation(&self, _a: UserId, _b: UserId) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn conversation_partners(&self, _user: UserId) -> Result<Vec<UserId>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_aborts_before_any_push() {
        let users = Arc::new(MemoryUserStore::new());
        let presence = Arc::new(PresenceRegistry::new());
        let pipeline = FanoutPipeline::new(
            users.clone() as Arc<dyn UserStore>,
            Arc::new(UnavailableMessageStore),
            presence.clone(),
        );

        let alice = seed_user(&users, "alice@example.com").await;
        let bob = seed_user(&users, "bob@example.com").await;
        let mut bob_rx = connect(&presence, bob);

        assert!(matches!(
            pipeline
                .dispatch(alice, bob, "hi".to_string(), "text".to_string())
                .await,
            Err(FanoutError::Store(StoreError::Database(_)))
        ));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_self_message_single_delivery() {
        let fx = fixture();
        let alice = seed_user(&fx.users, "alice@example.com").await;
        let mut alice_rx = connect(&fx.presence, alice);

        let receipt = fx
            .pipeline
            .dispatch(alice, alice, "note to self".to_string(), "text".to_string())
            .await
            .unwrap();

        assert_eq!(receipt.deliveries, 1);
        assert!(alice_rx.try_recv().is_ok());
        assert!(alice_rx.try_recv().is_err());

        let history = fx.messages.find_conversation(alice, alice).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_dead_connection_push_is_swallowed() {
        let fx = fixture();
        let alice = seed_user(&fx.users, "alice@example.com").await;
        let bob = seed_user(&fx.users, "bob@example.com").await;

        // Bob's connection task has exited but the entry lingers.
        let (handle, rx) = ClientHandle::channel();
        fx.presence.register(bob, handle);
        drop(rx);

        let receipt = fx
            .pipeline
            .dispatch(alice, bob, "hi".to_string(), "text".to_string())
            .await
            .unwrap();

        // The push failed but the message is durable.
        assert_eq!(receipt.deliveries, 0);
        assert_eq!(
            fx.messages.find_conversation(alice, bob).await.unwrap().len(),
            1
        );
    }
}
