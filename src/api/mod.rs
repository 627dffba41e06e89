//! HTTP API. Every protected route runs the guard chain from
//! [`guards`] before touching the database; permission failures are
//! recovered as redirects, never surfaced as hard errors.

pub mod auth;
pub mod guards;
pub mod projects;
pub mod tickets;
pub mod users;

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use bugtrack_core::{Database, StoreError};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub uploads_dir: PathBuf,
}

pub fn create_router(db: Database, uploads_dir: PathBuf) -> Router {
    let state = AppState { db, uploads_dir };
    Router::new()
        .merge(auth::routes())
        .merge(users::routes())
        .merge(projects::routes())
        .merge(tickets::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    /// Guard recovery: 303 to the given path.
    Redirect(String),
    NotFound,
    /// Malformed input, re-presented to the caller.
    Validation(String),
    Forbidden(String),
    Internal(String),
}

impl ApiError {
    pub fn redirect(path: impl Into<String>) -> Self {
        Self::Redirect(path.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::InvalidInput(msg) => Self::Validation(msg),
            StoreError::Configuration(msg) => {
                tracing::error!("registry misconfiguration: {msg}");
                Self::Internal(msg)
            }
            StoreError::Sqlite(e) => {
                tracing::error!("database error: {e}");
                Self::Internal(e.to_string())
            }
            StoreError::Io(e) => {
                tracing::error!("io error: {e}");
                Self::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Redirect(path) => Redirect::to(&path).into_response(),
            Self::NotFound => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "not found" })),
            )
                .into_response(),
            Self::Validation(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({ "error": msg })),
            )
                .into_response(),
            Self::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": msg })),
            )
                .into_response(),
            Self::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": msg })),
            )
                .into_response(),
        }
    }
}
