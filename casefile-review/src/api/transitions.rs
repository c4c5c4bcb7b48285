//! State machine endpoints
//!
//! Every transition requires the caller to hold the record lock.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use super::body::OptionalJson;
use super::identity::Caller;
use crate::error::WorkflowResult;
use crate::models::{Record, RecordId};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct NotesRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

/// POST /api/records/:id/submit-for-review
pub async fn submit_for_review(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
) -> WorkflowResult<Json<Record>> {
    Ok(Json(state.engine.machine.submit_for_review(record_id, &actor).await?))
}

/// POST /api/records/:id/advance
///
/// Takes the next forward edge from the current status. `notes` only
/// applies when that edge is approval.
pub async fn advance(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
    OptionalJson(body): OptionalJson<NotesRequest>,
) -> WorkflowResult<Json<Record>> {
    let notes = body.notes;
    Ok(Json(state.engine.machine.advance(record_id, &actor, notes).await?))
}

/// POST /api/records/:id/approve
pub async fn approve(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
    OptionalJson(body): OptionalJson<NotesRequest>,
) -> WorkflowResult<Json<Record>> {
    let notes = body.notes;
    Ok(Json(state.engine.machine.approve(record_id, &actor, notes).await?))
}

/// POST /api/records/:id/reject
pub async fn reject(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
    Json(request): Json<RejectRequest>,
) -> WorkflowResult<Json<Record>> {
    Ok(Json(
        state.engine.machine.reject(record_id, &actor, &request.reason).await?,
    ))
}
