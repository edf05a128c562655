use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{middleware, Json, Router};
use institute_core::validation::{FieldError, ValidationError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::require_auth;
use crate::backup::Orchestrator;
use crate::config::DaemonConfig;
use crate::db::Db;
use crate::mailer::Mailer;

pub mod auth;
pub mod backup;
pub mod fees;
pub mod students;
pub mod subjects;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: DaemonConfig,
    pub mailer: Arc<dyn Mailer>,
    pub backup: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(db: Db, config: DaemonConfig, mailer: Arc<dyn Mailer>, backup: Arc<Orchestrator>) -> Self {
        Self {
            db,
            config,
            mailer,
            backup,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Server-side failure reported to the client with a specific message.
    #[error("{0}")]
    Failed(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request<E: std::fmt::Display>(e: E) -> Self {
        Self::BadRequest(e.to_string())
    }
    pub fn not_found(msg: &str) -> Self {
        Self::NotFound(msg.to_string())
    }
    pub fn conflict(msg: &str) -> Self {
        Self::Conflict(msg.to_string())
    }
    pub fn failed(msg: &str) -> Self {
        Self::Failed(msg.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(format!("{e:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (code, body) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, message(&m)),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, message(&m)),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, message(&m)),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, message(&m)),
            ApiError::Validation(v) => (StatusCode::BAD_REQUEST, field_errors(&v.errors)),
            ApiError::Failed(m) => (StatusCode::INTERNAL_SERVER_ERROR, message(&m)),
            ApiError::Internal(m) => {
                error!(err = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message("Server error"))
            }
        };
        (code, Json(body)).into_response()
    }
}

fn message(m: &str) -> serde_json::Value {
    json!({ "success": false, "message": m })
}

fn field_errors(errors: &[FieldError]) -> serde_json::Value {
    json!({ "success": false, "errors": errors })
}

/// `{"success": true}` merged with `extra`'s fields.
pub fn ok(extra: serde_json::Value) -> Json<serde_json::Value> {
    let mut body = json!({ "success": true });
    if let (Some(out), serde_json::Value::Object(fields)) = (body.as_object_mut(), extra) {
        out.extend(fields);
    }
    Json(body)
}

/// Full `/api` router. Everything except the onboarding, login and reset
/// routes requires a bearer session.
pub fn router(state: AppState) -> Router {
    let guarded = Router::new()
        .route("/students", get(students::list).post(students::create))
        .route(
            "/students/{id}",
            get(students::get_one).put(students::update).delete(students::remove),
        )
        .route("/subjects", get(subjects::list).post(subjects::create))
        .route(
            "/subjects/{id}",
            get(subjects::get_one).put(subjects::update).delete(subjects::remove),
        )
        .route("/fees", get(fees::list).post(fees::create))
        .route("/fees/summary/by-student", get(fees::summary_by_student))
        .route("/fees/summary/monthly", get(fees::monthly_summary))
        .route("/fees/by-student/{student_id}/last", get(fees::last_for_student))
        .route(
            "/fees/{id}",
            get(fees::get_one).put(fees::update).delete(fees::remove),
        )
        .route(
            "/auth/system-user/logo",
            patch(auth::set_logo).delete(auth::clear_logo),
        )
        .route("/backup/run", post(backup::run))
        .route("/backup/status", get(backup::status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let open = Router::new()
        .route("/auth/system-user", get(auth::status).post(auth::create_owner))
        .route("/auth/system-user/request-otp", post(auth::request_create_otp))
        .route(
            "/auth/system-user/reset-password/request-otp",
            post(auth::request_reset_otp),
        )
        .route("/auth/system-user/reset-password", post(auth::reset_password))
        .route("/auth/login", post(auth::login));

    Router::new()
        .nest("/api", guarded.merge(open))
        .with_state(state)
}
