//! Validation issue and verification dispute endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::body::OptionalJson;
use super::identity::Caller;
use crate::error::WorkflowResult;
use crate::models::{RecordId, ValidationIssue, VerificationDispute};
use crate::workflow::{NewDispute, NewIssue};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ResolveIssueRequest {
    #[serde(default)]
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveDisputeRequest {
    pub resolution: String,
}

/// GET /api/records/:id/issues
pub async fn list_issues(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
) -> WorkflowResult<Json<Vec<ValidationIssue>>> {
    Ok(Json(state.engine.tracker.list_issues(record_id, &actor).await?))
}

/// POST /api/records/:id/issues
pub async fn raise_issue(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
    Json(request): Json<NewIssue>,
) -> WorkflowResult<(StatusCode, Json<ValidationIssue>)> {
    let issue = state.engine.tracker.raise_issue(record_id, &actor, request).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

/// POST /api/issues/:id/resolve
pub async fn resolve_issue(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(issue_id): Path<Uuid>,
    OptionalJson(request): OptionalJson<ResolveIssueRequest>,
) -> WorkflowResult<Json<ValidationIssue>> {
    let issue = state
        .engine
        .tracker
        .resolve_issue(issue_id, &actor, request.resolution)
        .await?;
    Ok(Json(issue))
}

/// GET /api/records/:id/disputes
pub async fn list_disputes(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
) -> WorkflowResult<Json<Vec<VerificationDispute>>> {
    Ok(Json(state.engine.tracker.list_disputes(record_id, &actor).await?))
}

/// POST /api/records/:id/disputes
pub async fn raise_dispute(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
    Json(request): Json<NewDispute>,
) -> WorkflowResult<(StatusCode, Json<VerificationDispute>)> {
    let dispute = state.engine.tracker.raise_dispute(record_id, &actor, request).await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

/// POST /api/disputes/:id/resolve
pub async fn resolve_dispute(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(dispute_id): Path<Uuid>,
    Json(request): Json<ResolveDisputeRequest>,
) -> WorkflowResult<Json<VerificationDispute>> {
    let dispute = state
        .engine
        .tracker
        .resolve_dispute(dispute_id, &actor, &request.resolution)
        .await?;
    Ok(Json(dispute))
}
