use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use bugtrack_core::models::{
    CreateCommentInput, CreateTicketInput, Role, Ticket, TicketComment, TicketCounts,
    TicketDetail, TicketFile, TicketStatus, UpdateTicketInput,
};
use bugtrack_core::Permission;

use super::guards::{back_or_home, can_view_ticket, require_permission, require_user};
use super::{ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/tickets", get(my_tickets).post(submit_ticket))
        .route("/tickets/{id}", get(ticket_detail).put(update_ticket))
        .route("/tickets/{id}/comments", post(add_comment))
        .route("/tickets/{id}/files", post(upload_file))
}

async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TicketCounts>, ApiError> {
    require_user(&state, &headers)?;
    Ok(Json(state.db.ticket_counts()?))
}

async fn my_tickets(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    let user = require_user(&state, &headers)?;
    Ok(Json(state.db.list_tickets_for_user(&user)?))
}

async fn submit_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateTicketInput>,
) -> Result<Json<Ticket>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_permission(&state, &user, Permission::AddTicket)?;

    if state.db.get_project(input.project_id)?.is_none() {
        return Err(ApiError::NotFound);
    }
    let ticket = state.db.create_ticket(user.id, input)?;
    tracing::info!(ticket_id = %ticket.id, submitter = %user.username, "ticket submitted");
    Ok(Json(ticket))
}

async fn ticket_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<TicketDetail>, ApiError> {
    let user = require_user(&state, &headers)?;
    let detail = state.db.get_ticket_detail(id)?.ok_or(ApiError::NotFound)?;
    if !can_view_ticket(&state, &user, &detail.ticket)? {
        return Err(back_or_home(&headers));
    }
    Ok(Json(detail))
}

async fn update_ticket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTicketInput>,
) -> Result<Json<Ticket>, ApiError> {
    let user = require_user(&state, &headers)?;

    // closed tickets are read-only regardless of permission, so the record
    // state is checked before the permission chain
    let ticket = state.db.get_ticket(id)?.ok_or(ApiError::NotFound)?;
    if ticket.status == TicketStatus::Closed {
        return Err(ApiError::redirect(format!("/tickets/{id}")));
    }
    require_permission(&state, &user, Permission::ChangeTicket)?;
    if let Some(dev_id) = input.assigned_developer_id {
        let dev = state.db.get_user(dev_id)?.ok_or(ApiError::NotFound)?;
        if dev.role != Role::Developer {
            return Err(ApiError::Validation(
                "tickets can only be assigned to developers".into(),
            ));
        }
    }

    Ok(Json(state.db.update_ticket(id, input)?))
}

async fn add_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateCommentInput>,
) -> Result<Json<TicketComment>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_permission(&state, &user, Permission::AddComment)?;
    Ok(Json(state.db.add_comment(id, user.id, input.message)?))
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    name: String,
}

/// Accepts the raw request body and persists it under the uploads
/// directory; only the stored reference goes into the database.
async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<Json<TicketFile>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_permission(&state, &user, Permission::AddTicketFiles)?;

    if params.name.trim().is_empty() {
        return Err(ApiError::Validation("file name must not be empty".into()));
    }
    let ticket = state.db.get_ticket(id)?.ok_or(ApiError::NotFound)?;
    if ticket.status == TicketStatus::Closed {
        return Err(ApiError::Validation(
            "files can only be attached to open tickets".into(),
        ));
    }

    // flatten the logical name so it cannot escape the uploads directory
    let safe_name: String = params
        .name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let stored = state
        .uploads_dir
        .join(format!("{}_{safe_name}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&state.uploads_dir)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store upload: {e}")))?;
    tokio::fs::write(&stored, &body)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store upload: {e}")))?;

    let file = match state.db.add_ticket_file(
        id,
        user.id,
        params.name,
        stored.to_string_lossy().into_owned(),
    ) {
        Ok(file) => file,
        Err(err) => {
            // don't leave the bytes orphaned if the reference insert failed
            let _ = tokio::fs::remove_file(&stored).await;
            return Err(err.into());
        }
    };
    tracing::info!(ticket_id = %id, file = %file.file_name, "file uploaded");
    Ok(Json(file))
}
