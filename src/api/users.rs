//! Role management, restricted to holders of the change_user permission.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};

use bugtrack_core::models::{AssignRolesInput, User};
use bugtrack_core::Permission;

use super::guards::{require_permission, require_user};
use super::{ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/roles", post(assign_roles))
}

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<User>>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_permission(&state, &user, Permission::ChangeUser)?;
    Ok(Json(state.db.list_users()?))
}

/// Assign a role to a batch of users. Each save re-derives the user's
/// group membership.
async fn assign_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<AssignRolesInput>,
) -> Result<Json<Vec<User>>, ApiError> {
    let requester = require_user(&state, &headers)?;
    require_permission(&state, &requester, Permission::ChangeUser)?;

    if input.user_ids.is_empty() {
        return Err(ApiError::Validation("no users selected".into()));
    }

    let mut updated = Vec::with_capacity(input.user_ids.len());
    for user_id in input.user_ids {
        updated.push(state.db.set_user_role(user_id, input.role)?);
    }
    Ok(Json(updated))
}
