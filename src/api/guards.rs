//! Per-view guard chain, evaluated in order: authentication, permission
//! code, then (for record-scoped views) a relationship predicate against
//! the specific record. Each stage recovers a failure as a redirect.

use axum::http::header::{AUTHORIZATION, REFERER};
use axum::http::HeaderMap;
use uuid::Uuid;

use bugtrack_core::models::{Project, Role, Ticket, User};
use bugtrack_core::Permission;

use super::{ApiError, AppState};

fn bearer_token(headers: &HeaderMap) -> Option<Uuid> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    Uuid::parse_str(token.trim()).ok()
}

/// Stage (a): resolve the requester from the session token, or redirect
/// to the login page.
pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| ApiError::redirect("/login"))?;
    state
        .db
        .get_session_user(token)?
        .ok_or_else(|| ApiError::redirect("/login"))
}

/// Stage (b): check the required permission, or redirect to the dashboard.
pub fn require_permission(
    state: &AppState,
    user: &User,
    perm: Permission,
) -> Result<(), ApiError> {
    if state.db.has_permission(user.id, perm)? {
        Ok(())
    } else {
        tracing::debug!(user = %user.username, perm = perm.codename(), "permission denied");
        Err(ApiError::redirect("/"))
    }
}

/// Stage (c) failure target: the referring page, or the dashboard.
pub fn back_or_home(headers: &HeaderMap) -> ApiError {
    let target = headers
        .get(REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("/");
    ApiError::redirect(target)
}

fn is_administrator(state: &AppState, user: &User) -> Result<bool, ApiError> {
    Ok(state
        .db
        .is_in_group(user.id, Role::Administrator.group_name())?)
}

/// Relationship predicate for project detail: Administrator, the project's
/// manager, or a member of its assigned personnel.
pub fn can_view_project(
    state: &AppState,
    user: &User,
    project: &Project,
) -> Result<bool, ApiError> {
    if is_administrator(state, user)? {
        return Ok(true);
    }
    if project.manager_id == Some(user.id) {
        return Ok(true);
    }
    Ok(state.db.is_assigned_to_project(project.id, user.id)?)
}

/// Relationship predicate for ticket detail: Administrator, the assigned
/// developer, or the submitter.
pub fn can_view_ticket(state: &AppState, user: &User, ticket: &Ticket) -> Result<bool, ApiError> {
    if is_administrator(state, user)? {
        return Ok(true);
    }
    if ticket.assigned_developer_id == Some(user.id) && user.role == Role::Developer {
        return Ok(true);
    }
    Ok(ticket.submitter_id == user.id && user.role == Role::Submitter)
}
