use axum::extract::State;
use axum::Json;
use institute_core::backup::BackupReason;
use serde_json::{json, Value};

use super::{ok, ApiError, AppState};

/// Manual due-check. Does nothing when this month's backup is recorded.
pub async fn run(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let outcome = state.backup.run_if_due(BackupReason::Manual).await;
    Ok(ok(json!({ "outcome": outcome })))
}

/// Last recorded run plus whether one is in progress right now.
pub async fn status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let last = state.backup.state_store().try_read().await;
    Ok(ok(json!({
        "state": last,
        "running": state.backup.is_running(),
        "queued": state.backup.queued_triggers(),
    })))
}
