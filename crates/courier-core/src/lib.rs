//! # courier-core
//!
//! The realtime core of the Courier messaging backend: presence tracking
//! and message fan-out.
//!
//! - **PresenceRegistry** - Which user currently owns which live connection
//! - **FanoutPipeline** - Persist an inbound message, then push it to
//!   whichever of {sender, recipient} are present
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ send ┌──────────────┐ append ┌───────────────┐
//! │  Connection │─────▶│   Fan-out    │───────▶│ Message Store │
//! └─────────────┘      │   Pipeline   │        └───────────────┘
//!                      └──────┬───────┘
//!                             │ lookup + push (best-effort)
//!                             ▼
//!                      ┌──────────────┐
//!                      │   Presence   │
//!                      │   Registry   │
//!                      └──────────────┘
//! ```
//!
//! Persistence strictly happens-before any push; live delivery is
//! best-effort and never rolls persistence back.

pub mod fanout;
pub mod presence;

pub use fanout::{DispatchReceipt, FanoutError, FanoutPipeline};
pub use presence::{ClientHandle, ConnectionId, PresenceRegistry, PushError};
