//! HTTP routes.
//!
//! Thin CRUD surface over the stores. Protected routes authenticate with
//! the same verifier and the same credential locations (bearer header,
//! then cookie) as the realtime handshake.

mod auth;
mod contacts;
mod messages;

use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    Json, Router,
};
use courier_auth::{extract_credential, CredentialLocations, CredentialSource};
use courier_protocol::UserId;
use courier_store::StoreError;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

/// Credential locations accepted on HTTP requests.
const HTTP_SOURCES: [CredentialSource; 2] =
    [CredentialSource::BearerHeader, CredentialSource::Cookie];

/// Assemble the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api/auth", auth::router())
        .nest("/api/contacts", contacts::router())
        .nest("/api/messages", messages::router())
}

/// The authenticated caller, extracted from the request credential.
///
/// Unlike the realtime handshake, HTTP has a response channel: a missing
/// credential is a 401 here, never a degraded admission.
pub struct AuthedUser(pub UserId);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthedUser {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let locations = CredentialLocations {
            auth_param: None,
            authorization: parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
            cookie: parts
                .headers
                .get(header::COOKIE)
                .and_then(|v| v.to_str().ok()),
        };

        let token = extract_credential(&HTTP_SOURCES, &locations).ok_or((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Access denied. No token provided." })),
        ))?;

        let user = state.verifier.verify(&token).map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": "Invalid token." })),
            )
        })?;

        Ok(AuthedUser(user))
    }
}

/// Map a store error to an HTTP response.
pub(crate) fn store_error(e: StoreError) -> (StatusCode, Json<Value>) {
    match e {
        StoreError::DuplicateEmail => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Email is already registered." })),
        ),
        StoreError::EmptyContent => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Content is required." })),
        ),
        other => {
            error!(error = %other, "Store operation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Internal server error." })),
            )
        }
    }
}
