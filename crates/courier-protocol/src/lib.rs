//! # courier-protocol
//!
//! Wire event definitions for the Courier direct-messaging backend.
//!
//! This crate defines the JSON events exchanged between clients and the
//! server over the realtime channel, plus the shared identity and profile
//! types embedded in them.
//!
//! ## Events
//!
//! - `sendMessage` - Client asks the server to deliver a direct message
//! - `receiveMessage` - Server pushes a delivered message to a live client
//! - `connected` / `error` / `ping` / `pong` - Connection control
//!
//! ## Example
//!
//! ```rust
//! use courier_protocol::{codec, ClientEvent};
//!
//! let raw = r#"{"event":"sendMessage","recipient":"7f8d2a90-3c4b-4f6e-9a1d-2b5c8e7f0a1b","content":"hi"}"#;
//! let event = codec::decode_client(raw).unwrap();
//! assert!(matches!(event, ClientEvent::SendMessage { .. }));
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode_client, encode_server, ProtocolError};
pub use events::{ClientEvent, EventKind, ServerEvent, UserProfile};

/// Stable unique identifier of a registered user.
pub type UserId = uuid::Uuid;

/// Store-assigned unique identifier of a persisted message.
pub type MessageId = uuid::Uuid;
