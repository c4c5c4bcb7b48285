//! Record lock endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::identity::Caller;
use crate::error::WorkflowResult;
use crate::models::{LockInfo, RecordId};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AcquireQuery {
    /// Keep the original `locked_at` when refreshing an own lock
    #[serde(default)]
    pub extend: bool,
}

/// GET /api/records/:id/lock
///
/// `null` when the record is unlocked or the lock has expired.
pub async fn lock_status(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
) -> WorkflowResult<Json<Option<LockInfo>>> {
    Ok(Json(state.engine.locks.status(record_id, &actor).await?))
}

/// POST /api/records/:id/lock[?extend=true]
pub async fn acquire_lock(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
    Query(query): Query<AcquireQuery>,
) -> WorkflowResult<Json<LockInfo>> {
    let info = state
        .engine
        .locks
        .acquire_or_extend(record_id, &actor, query.extend)
        .await?;
    Ok(Json(info))
}

/// DELETE /api/records/:id/lock
pub async fn release_lock(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
) -> WorkflowResult<StatusCode> {
    state.engine.locks.release(record_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}
