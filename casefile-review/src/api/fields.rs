//! Field verification ledger endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::body::OptionalJson;
use super::identity::Caller;
use crate::error::WorkflowResult;
use crate::models::{FieldVerification, LedgerSummary, RecordId};
use crate::workflow::PassRequest;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FirstPassBody {
    /// Value being verified; defaults to the record's live value
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(flatten)]
    pub pass: PassRequest,
}

#[derive(Debug, Serialize)]
pub struct FieldsResponse {
    pub fields: Vec<FieldVerification>,
    pub summary: LedgerSummary,
}

/// GET /api/records/:id/fields
pub async fn list_fields(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
) -> WorkflowResult<Json<FieldsResponse>> {
    let fields = state.engine.ledger.list(record_id, &actor).await?;
    let summary = state.engine.ledger.summarize(record_id, &actor).await?;
    Ok(Json(FieldsResponse { fields, summary }))
}

/// POST /api/records/:id/fields/:field/first-pass
pub async fn first_pass(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((record_id, field_name)): Path<(RecordId, String)>,
    OptionalJson(body): OptionalJson<FirstPassBody>,
) -> WorkflowResult<Json<FieldVerification>> {
    let row = state
        .engine
        .ledger
        .record_first_pass(record_id, &field_name, &actor, body.value, body.pass)
        .await?;
    Ok(Json(row))
}

/// POST /api/records/:id/fields/:field/second-pass
pub async fn second_pass(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path((record_id, field_name)): Path<(RecordId, String)>,
    OptionalJson(pass): OptionalJson<PassRequest>,
) -> WorkflowResult<Json<FieldVerification>> {
    let row = state
        .engine
        .ledger
        .record_second_pass(record_id, &field_name, &actor, pass)
        .await?;
    Ok(Json(row))
}
