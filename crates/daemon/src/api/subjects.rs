use axum::extract::{Path, Query, State};
use axum::Json;
use institute_core::api::{non_blank, ListQuery, SubjectInput};
use institute_core::model::Subject;
use institute_core::{new_id, now_utc};
use serde_json::{json, Value};

use super::{ok, ApiError, AppState};

const NOT_FOUND: &str = "Subject not found";
const DUPLICATE: &str = "Subject already exists";

fn subject_name(input: &SubjectInput) -> Result<String, ApiError> {
    non_blank(&input.subject_name)
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("subjectName is required"))
}

pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = state.db.list_subjects(&q).await?;
    Ok(ok(json!({
        "data": page.data,
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<SubjectInput>,
) -> Result<Json<Value>, ApiError> {
    let name = subject_name(&input)?;
    if state.db.subject_name_taken(&name, None).await? {
        return Err(ApiError::conflict(DUPLICATE));
    }
    let now = now_utc();
    let subject = Subject {
        id: new_id(),
        subject_name: name,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    };
    state.db.create_subject(&subject).await?;
    Ok(ok(json!({ "subject": subject })))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let subject = state
        .db
        .get_subject(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    Ok(ok(json!({ "subject": subject })))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SubjectInput>,
) -> Result<Json<Value>, ApiError> {
    let name = subject_name(&input)?;
    let mut subject = state
        .db
        .get_subject(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    if state.db.subject_name_taken(&name, Some(&id)).await? {
        return Err(ApiError::conflict(DUPLICATE));
    }
    subject.subject_name = name;
    subject.updated_at = now_utc();
    state.db.save_subject(&subject).await?;
    Ok(ok(json!({ "subject": subject })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.db.delete_subject(&id).await? {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    Ok(ok(json!({})))
}
