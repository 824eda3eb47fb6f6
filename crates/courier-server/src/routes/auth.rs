//! Authentication routes: signup, login, logout, profile.

use super::{store_error, AuthedUser};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use courier_auth::TOKEN_COOKIE;
use courier_store::{verify_password, ProfileUpdate};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/userinfo", get(userinfo))
        .route("/update-profile", post(update_profile))
}

#[derive(Debug, Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

/// Session cookie attributes match the browser-client deployment: the API
/// and the client live on different origins.
fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!("{TOKEN_COOKIE}={token}; HttpOnly; Secure; SameSite=None; Max-Age={max_age_secs}; Path=/")
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Credentials>,
) -> Response {
    if body.email.is_empty() || body.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Email and password are required." })),
        )
            .into_response();
    }

    match state.users.create(&body.email, &body.password).await {
        Ok(user) => {
            info!(user = %user.id, "User registered");
            (StatusCode::CREATED, Json(json!({ "user": user.profile() }))).into_response()
        }
        Err(e) => store_error(e).into_response(),
    }
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Credentials>,
) -> Response {
    if body.email.is_empty() || body.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "Email and password are required." })),
        )
            .into_response();
    }

    let user = match state.users.find_by_email(&body.email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "Invalid email or password" })),
            )
                .into_response()
        }
        Err(e) => return store_error(e).into_response(),
    };

    match verify_password(&user, &body.password) {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": "Invalid email or password" })),
            )
                .into_response()
        }
        Err(e) => return store_error(e).into_response(),
    }

    let Ok(token) = state.verifier.issue(user.id) else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Internal server error." })),
        )
            .into_response();
    };

    info!(user = %user.id, "User logged in");
    (
        StatusCode::CREATED,
        [(
            header::SET_COOKIE,
            session_cookie(&token, state.verifier.ttl().as_secs()),
        )],
        Json(json!({ "user": user.profile(), "token": token })),
    )
        .into_response()
}

async fn logout(AuthedUser(user): AuthedUser) -> Response {
    info!(user = %user, "User logged out");
    (
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie("", 0))],
        Json(json!({ "message": "Logout successful" })),
    )
        .into_response()
}

async fn userinfo(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
) -> Response {
    match state.users.find_by_id(user).await {
        Ok(Some(user)) => (StatusCode::OK, Json(json!(user.profile()))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "User not found." })),
        )
            .into_response(),
        Err(e) => store_error(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateProfileRequest {
    first_name: String,
    last_name: String,
    #[serde(default)]
    color: Option<String>,
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthedUser(user): AuthedUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Response {
    if body.first_name.is_empty() || body.last_name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "First name and last name are required." })),
        )
            .into_response();
    }

    let update = ProfileUpdate {
        first_name: body.first_name,
        last_name: body.last_name,
        avatar_color: body.color,
    };

    match state.users.update_profile(user, update).await {
        Ok(Some(user)) => (StatusCode::OK, Json(json!(user.profile()))).into_response(),
        Ok(None) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "message": "User not found." })),
        )
            .into_response(),
        Err(e) => store_error(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cookie_shape() {
        let cookie = session_cookie("abc123", 3600);
        assert!(cookie.starts_with("token=abc123;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=3600"));
    }

    #[test]
    fn test_cleared_cookie_expires_immediately() {
        let cookie = session_cookie("", 0);
        assert!(cookie.starts_with("token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}
