//! Multi-source credential extraction.
//!
//! A connection may present its credential in one of several locations.
//! The accepted locations and their priority are configuration, not
//! hard-coded branching: extraction walks an ordered list of sources and
//! the first non-empty value wins.

use serde::{Deserialize, Serialize};

/// Name of the cookie carrying the session token.
pub const TOKEN_COOKIE: &str = "token";

/// A location a credential may be extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Explicit auth field supplied with the handshake (query parameter on
    /// the upgrade request).
    AuthParam,
    /// `Authorization: Bearer <token>` header.
    BearerHeader,
    /// Session token cookie.
    Cookie,
}

/// Default extraction order: handshake auth field, then bearer header,
/// then cookie.
pub const DEFAULT_SOURCES: [CredentialSource; 3] = [
    CredentialSource::AuthParam,
    CredentialSource::BearerHeader,
    CredentialSource::Cookie,
];

/// Raw credential locations captured from one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialLocations<'a> {
    /// Value of the explicit handshake auth field, if present.
    pub auth_param: Option<&'a str>,
    /// Raw `Authorization` header value, if present.
    pub authorization: Option<&'a str>,
    /// Raw `Cookie` header value, if present.
    pub cookie: Option<&'a str>,
}

/// Extract a credential by walking `sources` in order.
///
/// Returns the first non-empty credential found, or `None` when no source
/// yields one.
#[must_use]
pub fn extract_credential(
    sources: &[CredentialSource],
    locations: &CredentialLocations<'_>,
) -> Option<String> {
    sources
        .iter()
        .find_map(|source| match source {
            CredentialSource::AuthParam => locations.auth_param.filter(|v| !v.is_empty()),
            CredentialSource::BearerHeader => locations.authorization.and_then(bearer_token),
            CredentialSource::Cookie => locations.cookie.and_then(cookie_token),
        })
        .map(str::to_string)
}

/// Extract the token from an `Authorization: Bearer <token>` value.
///
/// Returns `None` for a non-Bearer scheme or an empty token.
#[must_use]
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let token = authorization.strip_prefix("Bearer ")?;
    (!token.is_empty()).then_some(token)
}

/// Extract the session token from a raw `Cookie` header value.
#[must_use]
pub fn cookie_token(cookie_header: &str) -> Option<&str> {
    cookie_header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == TOKEN_COOKIE && !value.is_empty()).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let locations = CredentialLocations {
            auth_param: Some("from-param"),
            authorization: Some("Bearer from-header"),
            cookie: Some("token=from-cookie"),
        };

        assert_eq!(
            extract_credential(&DEFAULT_SOURCES, &locations).as_deref(),
            Some("from-param")
        );
    }

    #[test]
    fn test_falls_through_empty_sources() {
        let locations = CredentialLocations {
            auth_param: Some(""),
            authorization: None,
            cookie: Some("theme=dark; token=abc123"),
        };

        assert_eq!(
            extract_credential(&DEFAULT_SOURCES, &locations).as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn test_no_credential_anywhere() {
        let locations = CredentialLocations::default();
        assert_eq!(extract_credential(&DEFAULT_SOURCES, &locations), None);
    }

    #[test]
    fn test_configured_order_wins() {
        let locations = CredentialLocations {
            auth_param: Some("from-param"),
            authorization: Some("Bearer from-header"),
            cookie: None,
        };

        let header_first = [
            CredentialSource::BearerHeader,
            CredentialSource::AuthParam,
        ];
        assert_eq!(
            extract_credential(&header_first, &locations).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn test_bearer_token_scheme() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }

    #[test]
    fn test_cookie_token_parsing() {
        assert_eq!(cookie_token("token=abc"), Some("abc"));
        assert_eq!(cookie_token("a=b; token=abc; c=d"), Some("abc"));
        assert_eq!(cookie_token("token="), None);
        assert_eq!(cookie_token("session=abc"), None);
    }
}
