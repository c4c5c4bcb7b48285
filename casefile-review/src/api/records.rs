//! Submission, record view and history endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::identity::Caller;
use crate::error::WorkflowResult;
use crate::models::{Record, RecordDetails, RecordEvent, RecordId};
use crate::workflow::RecordView;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DetailsRequest {
    #[serde(default)]
    pub details: RecordDetails,
}

/// POST /api/records
pub async fn submit_record(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Json(request): Json<DetailsRequest>,
) -> WorkflowResult<(StatusCode, Json<Record>)> {
    let record = state.engine.submissions.submit(&actor, request.details).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/records/:id
pub async fn get_record(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
) -> WorkflowResult<Json<RecordView>> {
    Ok(Json(state.engine.submissions.get(record_id, &actor).await?))
}

/// POST /api/records/:id/resubmit
pub async fn resubmit_record(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
    Json(request): Json<DetailsRequest>,
) -> WorkflowResult<Json<Record>> {
    let record = state
        .engine
        .submissions
        .resubmit(record_id, &actor, request.details)
        .await?;
    Ok(Json(record))
}

/// GET /api/records/:id/history
pub async fn record_history(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
) -> WorkflowResult<Json<Vec<RecordEvent>>> {
    Ok(Json(state.engine.submissions.history(record_id, &actor).await?))
}
