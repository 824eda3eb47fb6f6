//! Contact routes: search, listing, conversation partners, bulk deletion.

use super::{store_error, AuthedUser};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use courier_protocol::{events::UserProfile, UserId};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", post(search))
        .route("/all-contacts", get(all_contacts))
        .route("/get-contacts-for-list", get(contacts_for_list))
        .route("/delete-dm/:peer", delete(delete_dm))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    search_term: String,
}

async fn search(
    State(state): State<Arc<AppState>>,
    AuthedUser(_): AuthedUser,
    Json(body): Json<SearchRequest>,
) -> Response {
    if body.search_term.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "searchTerm is required" })),
        )
            .into_response();
    }

    match state.users.search(&body.search_term).await {
        Ok(users) => {
            let contacts: Vec<UserProfile> = users.iter().map(|u| u.profile()).collect();
            (StatusCode::OK, Json(json!({ "contacts": contacts }))).into_response()
        }
        Err(e) => store_error(e).into_response(),
    }
}

async fn all_contacts(
    State(state): State<Arc<AppState>>,
    AuthedUser(_): AuthedUser,
) -> Response {
    match state.users.all().await {
        Ok(users) => {
            let contacts: Vec<UserProfile> = users.iter().map(|u| u.profile()).collect();
            (StatusCode::OK, Json(json!({ "contacts": contacts }))).into_response()
        }
        Err(e) => store_error(e).into_response(),
    }
}

/// Distinct conversation partners of the caller, most recent conversation
/// first.
async fn contacts_for_list(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
) -> Response {
    let partners = match state.messages.conversation_partners(user).await {
        Ok(partners) => partners,
        Err(e) => return store_error(e).into_response(),
    };

    let mut contacts = Vec::with_capacity(partners.len());
    for partner in partners {
        match state.users.find_by_id(partner).await {
            // A partner without a user record has been deleted; skip it.
            Ok(Some(record)) => contacts.push(record.profile()),
            Ok(None) => {}
            Err(e) => return store_error(e).into_response(),
        }
    }

    (StatusCode::OK, Json(json!({ "contacts": contacts }))).into_response()
}

async fn delete_dm(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
    Path(peer): Path<UserId>,
) -> Response {
    match state.messages.delete_conversation(user, peer).await {
        Ok(0) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "No direct messages found to delete" })),
        )
            .into_response(),
        Ok(deleted) => {
            info!(user = %user, peer = %peer, deleted, "Conversation deleted");
            (
                StatusCode::OK,
                Json(json!({ "message": "DM deleted successfully", "deleted": deleted })),
            )
                .into_response()
        }
        Err(e) => store_error(e).into_response(),
    }
}
