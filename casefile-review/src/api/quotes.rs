//! Quote endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::identity::Caller;
use crate::error::WorkflowResult;
use crate::models::{Quote, RecordId};
use crate::workflow::{NewQuote, QuoteUpdate};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct QuoteFilter {
    /// Only quotes linked to this field
    #[serde(default)]
    pub field: Option<String>,
}

/// GET /api/records/:id/quotes[?field=name]
pub async fn list_quotes(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
    Query(filter): Query<QuoteFilter>,
) -> WorkflowResult<Json<Vec<Quote>>> {
    let quotes = state
        .engine
        .quotes
        .list(record_id, &actor, filter.field.as_deref())
        .await?;
    Ok(Json(quotes))
}

/// POST /api/records/:id/quotes
pub async fn add_quote(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(record_id): Path<RecordId>,
    Json(request): Json<NewQuote>,
) -> WorkflowResult<(StatusCode, Json<Quote>)> {
    let quote = state.engine.quotes.add(record_id, &actor, request).await?;
    Ok((StatusCode::CREATED, Json(quote)))
}

/// PATCH /api/quotes/:id
pub async fn update_quote(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(quote_id): Path<Uuid>,
    Json(request): Json<QuoteUpdate>,
) -> WorkflowResult<Json<Quote>> {
    Ok(Json(state.engine.quotes.update(quote_id, &actor, request).await?))
}

/// DELETE /api/quotes/:id
pub async fn delete_quote(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(quote_id): Path<Uuid>,
) -> WorkflowResult<StatusCode> {
    state.engine.quotes.delete(quote_id, &actor).await?;
    Ok(StatusCode::NO_CONTENT)
}
