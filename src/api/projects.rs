use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, put};
use axum::{Json, Router};
use uuid::Uuid;

use bugtrack_core::models::{
    CreateProjectInput, ManageProjectUsersInput, Project, ProjectWithPersonnel, Role,
    UpdateProjectInput,
};
use bugtrack_core::Permission;

use super::guards::{back_or_home, can_view_project, require_permission, require_user};
use super::{ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(my_projects).post(create_project))
        .route("/projects/archived", get(archived_projects))
        .route("/projects/{id}", get(project_detail).put(update_project))
        .route("/projects/{id}/users", put(manage_project_users))
}

async fn my_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Project>>, ApiError> {
    let user = require_user(&state, &headers)?;
    Ok(Json(state.db.list_projects_for_user(&user)?))
}

async fn archived_projects(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Project>>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_permission(&state, &user, Permission::AddProject)?;
    Ok(Json(state.db.list_archived_projects()?))
}

/// The manager must hold the Project Manager role; assigned personnel may
/// not be Administrators or Project Managers, and never the requester.
fn validate_assignments(
    state: &AppState,
    requester: &Uuid,
    manager_id: Option<Uuid>,
    personnel: &[Uuid],
) -> Result<(), ApiError> {
    if let Some(manager_id) = manager_id {
        let manager = state.db.get_user(manager_id)?.ok_or(ApiError::NotFound)?;
        if manager.role != Role::ProjectManager {
            return Err(ApiError::Validation(
                "project manager must hold the Project Manager role".into(),
            ));
        }
    }
    for user_id in personnel {
        if user_id == requester {
            return Err(ApiError::Validation(
                "cannot assign yourself as project personnel".into(),
            ));
        }
        let member = state.db.get_user(*user_id)?.ok_or(ApiError::NotFound)?;
        if matches!(member.role, Role::Administrator | Role::ProjectManager) {
            return Err(ApiError::Validation(
                "assigned personnel must be developers or submitters".into(),
            ));
        }
    }
    Ok(())
}

async fn create_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateProjectInput>,
) -> Result<Json<Project>, ApiError> {
    let user = require_user(&state, &headers)?;
    require_permission(&state, &user, Permission::AddProject)?;
    validate_assignments(&state, &user.id, input.manager_id, &input.personnel)?;
    let project = state.db.create_project(input)?;
    tracing::info!(project_id = %project.id, title = %project.title, "project created");
    Ok(Json(project))
}

async fn project_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectWithPersonnel>, ApiError> {
    let user = require_user(&state, &headers)?;
    let project = state.db.get_project(id)?.ok_or(ApiError::NotFound)?;
    if !can_view_project(&state, &user, &project)? {
        return Err(back_or_home(&headers));
    }
    let personnel = state.db.list_project_personnel(id)?;
    Ok(Json(ProjectWithPersonnel { project, personnel }))
}

async fn update_project(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProjectInput>,
) -> Result<Json<Project>, ApiError> {
    let user = require_user(&state, &headers)?;

    // archived projects are read-only regardless of permission, so the
    // record state is checked before the permission chain
    let project = state.db.get_project(id)?.ok_or(ApiError::NotFound)?;
    if !project.is_active {
        return Err(ApiError::redirect(format!("/projects/{id}")));
    }
    require_permission(&state, &user, Permission::ChangeProject)?;

    Ok(Json(state.db.update_project(id, input)?))
}

async fn manage_project_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<ManageProjectUsersInput>,
) -> Result<Json<Project>, ApiError> {
    let user = require_user(&state, &headers)?;

    let project = state.db.get_project(id)?.ok_or(ApiError::NotFound)?;
    if !project.is_active {
        return Err(ApiError::redirect(format!("/projects/{id}")));
    }
    require_permission(&state, &user, Permission::ChangeProject)?;
    validate_assignments(&state, &user.id, input.manager_id, &input.personnel)?;

    Ok(Json(state.db.set_project_users(id, input)?))
}
