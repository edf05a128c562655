use axum::extract::{Path, Query, State};
use axum::Json;
use institute_core::api::{ListQuery, StudentInput};
use institute_core::validation::{validate_new_student, validate_student_patch};
use institute_core::{new_id, now_utc};
use serde_json::{json, Value};
use tracing::info;

use super::{ok, ApiError, AppState};

const NOT_FOUND: &str = "Student not found";
const DUPLICATE_AADHAAR: &str = "Aadhaar number already exists";

pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = state.db.list_students(&q).await?;
    Ok(ok(json!({
        "data": page.data,
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<StudentInput>,
) -> Result<Json<Value>, ApiError> {
    let draft = validate_new_student(&input)?;
    if state.db.aadhaar_taken(&draft.aadhaar_number, None).await? {
        return Err(ApiError::conflict(DUPLICATE_AADHAAR));
    }
    let student = draft.into_student(new_id(), now_utc());
    state.db.create_student(&student).await?;
    info!(id = %student.id, "student created");
    Ok(ok(json!({ "student": student })))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let student = state
        .db
        .get_student(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    Ok(ok(json!({ "student": student })))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<StudentInput>,
) -> Result<Json<Value>, ApiError> {
    let changes = validate_student_patch(&input)?;
    let mut student = state
        .db
        .get_student(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    if let Some(aadhaar) = &changes.aadhaar_number {
        if state.db.aadhaar_taken(aadhaar, Some(&id)).await? {
            return Err(ApiError::conflict(DUPLICATE_AADHAAR));
        }
    }
    changes.apply(&mut student, now_utc());
    state.db.save_student(&student).await?;
    Ok(ok(json!({ "student": student })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.db.delete_student(&id).await? {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    info!(%id, "student deleted");
    Ok(ok(json!({})))
}
