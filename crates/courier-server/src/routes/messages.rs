//! Message history routes.

use super::{store_error, AuthedUser};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use courier_protocol::UserId;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/get-messages", post(get_messages))
}

#[derive(Debug, Deserialize)]
struct GetMessagesRequest {
    /// The other participant of the conversation.
    id: UserId,
}

/// Conversation history with a peer, timestamp ascending.
///
/// The pair is unordered: the caller sees the same sequence regardless of
/// who sent what. Fetching a conversation with oneself is rejected here
/// even though the realtime path permits self-messages.
async fn get_messages(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
    Json(body): Json<GetMessagesRequest>,
) -> Response {
    if body.id == user {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Invalid request. Please refresh and try again." })),
        )
            .into_response();
    }

    match state.messages.find_conversation(user, body.id).await {
        Ok(messages) => (StatusCode::OK, Json(json!({ "messages": messages }))).into_response(),
        Err(e) => store_error(e).into_response(),
    }
}
