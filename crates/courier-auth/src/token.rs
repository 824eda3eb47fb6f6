//! Bearer token management for Courier.
//!
//! Tokens are HS256 JWTs carrying the user identity. Verification is a pure
//! check against the process-wide signing secret: no I/O, no side effects.

use chrono::Utc;
use courier_protocol::UserId;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default token lifetime (one hour).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Claims carried by a Courier session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User identifier the token was issued to.
    pub id: UserId,
    /// Expiration timestamp (Unix seconds).
    pub exp: u64,
    /// Issued-at timestamp (Unix seconds).
    pub iat: u64,
}

/// Errors that can occur during credential verification.
///
/// Malformed, expired, and tampered tokens are not distinguished to the
/// caller; the collapsed reason is retained for logs only.
#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    /// No credential was supplied in any accepted location.
    #[error("no credential supplied")]
    MissingCredential,

    /// A credential was supplied but did not verify.
    #[error("invalid credential")]
    InvalidCredential,
}

/// Verifies and mints Courier session tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenVerifier {
    /// Create a new verifier over the process signing secret.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }

    /// Create a verifier with the default one-hour token lifetime.
    #[must_use]
    pub fn with_default_ttl(secret: &[u8]) -> Self {
        Self::new(secret, DEFAULT_TOKEN_TTL)
    }

    /// Mint a session token for a user.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredential` if encoding fails (the key is unusable).
    pub fn issue(&self, user: UserId) -> Result<String, AuthError> {
        let now = Utc::now().timestamp() as u64;
        let claims = Claims {
            id: user,
            exp: now + self.ttl.as_secs(),
            iat: now,
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(|e| {
            warn!(error = %e, "Token encoding failed");
            AuthError::InvalidCredential
        })
    }

    /// Validate a token and return the embedded user identity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCredential` for malformed, expired, or tampered
    /// tokens.
    pub fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| {
                debug!(user = %data.claims.id, "Token validated");
                data.claims.id
            })
            .map_err(|e| {
                warn!(error = %e, "Token validation failed");
                AuthError::InvalidCredential
            })
    }

    /// Token lifetime used by `issue`.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn verifier(secret: &str) -> TokenVerifier {
        TokenVerifier::with_default_ttl(secret.as_bytes())
    }

    fn token_with_expiry(user: UserId, secret: &str, expires_in_seconds: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: user,
            exp: (now + expires_in_seconds).max(0) as u64,
            iat: now as u64,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let user = Uuid::new_v4();
        let v = verifier("test-secret");

        let token = v.issue(user).unwrap();
        assert_eq!(v.verify(&token).unwrap(), user);
    }

    #[test]
    fn test_verify_expired_token() {
        let user = Uuid::new_v4();
        let v = verifier("test-secret");

        // Expired one hour ago, past any validation leeway.
        let token = token_with_expiry(user, "test-secret", -3600);
        assert_eq!(v.verify(&token).unwrap_err(), AuthError::InvalidCredential);
    }

    #[test]
    fn test_verify_wrong_secret() {
        let user = Uuid::new_v4();
        let token = token_with_expiry(user, "secret-1", 3600);

        let v = verifier("secret-2");
        assert_eq!(v.verify(&token).unwrap_err(), AuthError::InvalidCredential);
    }

    #[test]
    fn test_verify_garbage_token() {
        let v = verifier("test-secret");
        assert_eq!(
            v.verify("not-a-jwt").unwrap_err(),
            AuthError::InvalidCredential
        );
    }

    #[test]
    fn test_tampered_token_rejected() {
        let user = Uuid::new_v4();
        let v = verifier("test-secret");
        let token = v.issue(user).unwrap();

        // Flip a character in the payload segment.
        let mut chars: Vec<char> = token.chars().collect();
        let mid = token.len() / 2;
        chars[mid] = if chars[mid] == 'a' { 'b' } else { 'a' };
        let tampered: String = chars.into_iter().collect();

        assert_eq!(v.verify(&tampered).unwrap_err(), AuthError::InvalidCredential);
    }
}
