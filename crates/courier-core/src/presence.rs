//! Presence tracking for Courier.
//!
//! The registry maps each authenticated user to their currently-live
//! connection handle. A user has at most one entry: a later connection for
//! the same user silently supersedes the earlier one, and removal compares
//! connection identity, never user identity, so the disconnect of a
//! superseded connection can never evict the current entry.

use courier_protocol::{ServerEvent, UserId};
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Atomic counter for ensuring unique IDs even within the same nanosecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from a known value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}", timestamp.wrapping_add(counter)))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Push failure. The pipeline is permitted to ignore this.
#[derive(Debug, Error)]
pub enum PushError {
    /// The connection's event loop has gone away.
    #[error("connection closed")]
    Closed,
}

/// A handle to one live connection.
///
/// The handle carries the connection identity plus the sender half of the
/// connection's outbound event queue. The socket itself stays owned by the
/// connection task; the registry only ever holds cheap clones of this
/// handle.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl ClientHandle {
    /// Create a handle over an existing outbound sender.
    #[must_use]
    pub fn new(id: ConnectionId, outbound: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { id, outbound }
    }

    /// Create a handle with a fresh ID and its paired outbound receiver.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(ConnectionId::generate(), tx), rx)
    }

    /// The connection identity.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Best-effort push of an event toward the connection.
    ///
    /// Enqueues onto the connection's outbound queue without awaiting
    /// socket I/O, so a hung peer cannot block the caller.
    ///
    /// # Errors
    ///
    /// Returns `Closed` if the connection task has already exited.
    pub fn push(&self, event: ServerEvent) -> Result<(), PushError> {
        self.outbound.send(event).map_err(|_| PushError::Closed)
    }
}

/// The process-local presence registry.
///
/// Constructed once at startup and injected into the gate and the fan-out
/// pipeline; safe for concurrent use from any connection task.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: DashMap<UserId, ClientHandle>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a user to a live connection.
    ///
    /// Overwrites any existing entry for the user (last connection wins).
    /// Returns the superseded handle, if any; no eviction is signalled to
    /// it.
    pub fn register(&self, user: UserId, handle: ClientHandle) -> Option<ClientHandle> {
        let superseded = self.entries.insert(user, handle);
        debug!(user = %user, superseded = superseded.is_some(), "Presence: registered");
        superseded
    }

    /// Remove the entry owned by this connection, if it still is.
    ///
    /// Matching is by connection identity, not user identity: after a
    /// supersession, the stale connection's disconnect finds no entry
    /// pointing at it and leaves the current one intact.
    ///
    /// Returns the user whose entry was removed, if any.
    pub fn unregister(&self, handle: &ClientHandle) -> Option<UserId> {
        let user = self
            .entries
            .iter()
            .find(|entry| entry.value().id() == handle.id())
            .map(|entry| *entry.key())?;

        // Re-check under the shard lock: a register for the same user may
        // have raced in between.
        let removed = self
            .entries
            .remove_if(&user, |_, current| current.id() == handle.id())
            .map(|(user, _)| user);

        if removed.is_some() {
            debug!(user = %user, connection = %handle.id(), "Presence: unregistered");
        }
        removed
    }

    /// Look up the live connection for a user, O(1).
    #[must_use]
    pub fn lookup(&self, user: UserId) -> Option<ClientHandle> {
        self.entries.get(&user).map(|entry| entry.value().clone())
    }

    /// Number of users currently present.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.entries.len()
    }
}
