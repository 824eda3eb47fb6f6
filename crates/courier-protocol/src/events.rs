//! Event types for the Courier realtime channel.
//!
//! Events are the messages exchanged between clients and the server once a
//! live connection is established. They are serialized as JSON text frames,
//! tagged by an `event` field.

use crate::{MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default message type tag when the client omits one.
pub const DEFAULT_MESSAGE_TYPE: &str = "text";

fn default_message_type() -> String {
    DEFAULT_MESSAGE_TYPE.to_string()
}

/// Event kind identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SendMessage,
    ReceiveMessage,
    Connected,
    Error,
    Ping,
    Pong,
}

/// Sanitized user record embedded in outbound payloads.
///
/// This is the public projection of a stored user: everything a client may
/// see, nothing it may not (no credential hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// User identifier.
    pub id: UserId,
    /// Registered email address.
    pub email: String,
    /// First name, once the profile is set up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Last name, once the profile is set up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Display color chosen during profile setup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_color: Option<String>,
    /// Whether the user completed profile setup.
    pub profile_complete: bool,
}

/// An event sent by a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Ask the server to deliver a direct message.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        /// Recipient user identifier.
        recipient: UserId,
        /// Message body. Must be non-empty.
        content: String,
        /// Free-form message tag, defaults to `"text"`.
        #[serde(default = "default_message_type")]
        message_type: String,
    },

    /// Keepalive ping.
    Ping {
        /// Optional client timestamp, echoed back in the pong.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ClientEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::SendMessage { .. } => EventKind::SendMessage,
            ClientEvent::Ping { .. } => EventKind::Ping,
        }
    }
}

/// An event pushed by the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Connection established response.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// A delivered direct message.
    ///
    /// Sent once per live target: the sender echo and the recipient each
    /// receive at most one copy.
    #[serde(rename_all = "camelCase")]
    ReceiveMessage {
        /// Store-assigned message identifier.
        id: MessageId,
        /// Full sender record.
        sender: UserProfile,
        /// Full recipient record.
        recipient: UserProfile,
        /// Message body.
        content: String,
        /// Message tag.
        message_type: String,
        /// Server-assigned persistence timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Error notification.
    Error {
        /// Error code.
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive pong.
    Pong {
        /// Echoed timestamp from the ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ServerEvent {
    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::Connected { .. } => EventKind::Connected,
            ServerEvent::ReceiveMessage { .. } => EventKind::ReceiveMessage,
            ServerEvent::Error { .. } => EventKind::Error,
            ServerEvent::Pong { .. } => EventKind::Pong,
        }
    }

    /// Create a new Connected event.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        ServerEvent::Connected {
            connection_id: connection_id.into(),
            heartbeat,
        }
    }

    /// Create a new Error event.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a new Pong event.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        ServerEvent::Pong { timestamp }
    }
}
