//! Demo-login authentication: four fixed demo accounts authenticate by
//! username alone, gated by the `is_demo` flag on the user record.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use bugtrack_core::models::User;

use super::guards::require_user;
use super::{ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
struct LoginInput {
    username: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: uuid::Uuid,
    user: User,
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state.db.get_user_by_username(&input.username)?;
    match user {
        Some(user) if user.is_demo => {
            let session = state.db.create_session(user.id)?;
            tracing::info!(username = %user.username, "demo login");
            Ok(Json(LoginResponse {
                token: session.token,
                user,
            }))
        }
        _ => Err(ApiError::Forbidden(
            "only demo accounts can log in this way".into(),
        )),
    }
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    // resolve the session before dropping it so an unauthenticated call
    // still redirects to /login
    let _user = require_user(&state, &headers)?;
    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|t| uuid::Uuid::parse_str(t.trim()).ok())
    {
        state.db.delete_session(token)?;
    }
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<User>, ApiError> {
    let user = require_user(&state, &headers)?;
    Ok(Json(user))
}
