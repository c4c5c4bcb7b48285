//! Review queue endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::identity::Caller;
use crate::error::WorkflowResult;
use crate::workflow::{QueueStage, RecordSummary};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub stage: QueueStage,
    #[serde(default)]
    pub include_own: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub stage: QueueStage,
    pub count: usize,
    pub records: Vec<RecordSummary>,
}

/// GET /api/queue?stage=needs_first_review&include_own=false
pub async fn get_queue(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Query(query): Query<QueueQuery>,
) -> WorkflowResult<Json<QueueResponse>> {
    let records = state
        .engine
        .queue
        .next_eligible(&actor, query.stage, query.include_own)
        .await?;

    Ok(Json(QueueResponse {
        stage: query.stage,
        count: records.len(),
        records,
    }))
}
