//! # courier-auth
//!
//! Identity verification for the Courier messaging backend.
//!
//! This crate provides the two halves of connection authentication:
//!
//! - **TokenVerifier** - validates (and mints) the bearer credential and
//!   maps it to a user identity
//! - **Credential extraction** - an ordered chain of locations a credential
//!   may arrive in, tried in sequence
//!
//! The same verifier is used by the HTTP layer and by the realtime
//! handshake: one credential format, one validity window, one failure
//! classification.

pub mod extract;
pub mod token;

pub use extract::{extract_credential, CredentialLocations, CredentialSource, TOKEN_COOKIE};
pub use token::{AuthError, Claims, TokenVerifier};
