//! Fee installments and the collection summaries built from them.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{Local, NaiveDate};
use institute_core::api::{FeesInput, ListQuery, YearQuery};
use institute_core::model::Student;
use institute_core::summary::{latest_installment, monthly_totals, summarize_by_student};
use institute_core::validation::{validate_fees_patch, validate_new_fees};
use institute_core::{new_id, now_utc};
use serde_json::{json, Value};
use tracing::info;

use super::{ok, ApiError, AppState};

const NOT_FOUND: &str = "Fees record not found";

/// Dates on installments may not lie after the institute's local today.
fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn active_student(state: &AppState, id: &str) -> Result<Student, ApiError> {
    state
        .db
        .get_student(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Student not found"))
}

pub async fn list(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = state.db.list_fees(&q).await?;
    Ok(ok(json!({
        "data": page.data,
        "total": page.total,
        "page": page.page,
        "limit": page.limit,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<FeesInput>,
) -> Result<Json<Value>, ApiError> {
    let draft = validate_new_fees(&input, today())?;
    let student = active_student(&state, &draft.student_id).await?;
    let fees = draft.into_record(new_id(), &student, now_utc());
    state.db.create_fees(&fees).await?;
    info!(id = %fees.id, student = %student.id, "fees recorded");
    Ok(ok(json!({ "fees": fees })))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let fees = state
        .db
        .get_fees(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    Ok(ok(json!({ "fees": fees })))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<FeesInput>,
) -> Result<Json<Value>, ApiError> {
    let changes = validate_fees_patch(&input, today())?;
    let mut fees = state
        .db
        .get_fees(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    let student = match &changes.student_id {
        Some(sid) => Some(active_student(&state, sid).await?),
        None => None,
    };
    changes.apply(&mut fees, student.as_ref(), now_utc());
    state.db.save_fees(&fees).await?;
    Ok(ok(json!({ "fees": fees })))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.db.delete_fees(&id).await? {
        return Err(ApiError::not_found(NOT_FOUND));
    }
    Ok(ok(json!({})))
}

pub async fn summary_by_student(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (fees, students) = tokio::try_join!(state.db.all_fees(), state.db.all_students())?;
    Ok(ok(json!({ "data": summarize_by_student(&fees, &students) })))
}

pub async fn monthly_summary(
    State(state): State<AppState>,
    Query(q): Query<YearQuery>,
) -> Result<Json<Value>, ApiError> {
    let fees = state.db.all_fees().await?;
    Ok(ok(json!({ "data": monthly_totals(&fees, q.year()) })))
}

/// Most recent installment recorded for one student.
pub async fn last_for_student(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let fees = state.db.fees_for_student(&student_id).await?;
    let last = latest_installment(&fees).ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    Ok(ok(json!({ "fees": last })))
}
