//! casefile-review library - Verification & Locking Workflow Engine
//!
//! Moves submitted records through a multi-stage human review pipeline with
//! time-boxed record locks, a per-field verification ledger and approval
//! blockers, and exposes it over HTTP.

use axum::Router;
use casefile_common::events::EventBus;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod workflow;

pub use error::{WorkflowError, WorkflowResult};
pub use workflow::{EngineSettings, WorkflowEngine};

/// Broadcast buffer per SSE subscriber
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub engine: WorkflowEngine,
    pub event_bus: EventBus,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, event_bus: EventBus, settings: EngineSettings) -> Self {
        let engine = WorkflowEngine::new(db.clone(), event_bus.clone(), settings);
        Self {
            db,
            engine,
            event_bus,
            startup_time: casefile_common::time::now(),
        }
    }
}

/// Build application router
///
/// `/health` and `/events` need no identity; everything under `/api`
/// resolves the caller from identity headers per request.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let records = Router::new()
        .route("/api/records", post(api::submit_record))
        .route("/api/records/:id", get(api::get_record))
        .route("/api/records/:id/resubmit", post(api::resubmit_record))
        .route("/api/records/:id/history", get(api::record_history))
        .route(
            "/api/records/:id/lock",
            get(api::lock_status)
                .post(api::acquire_lock)
                .delete(api::release_lock),
        )
        .route("/api/records/:id/submit-for-review", post(api::submit_for_review))
        .route("/api/records/:id/advance", post(api::advance))
        .route("/api/records/:id/approve", post(api::approve))
        .route("/api/records/:id/reject", post(api::reject))
        .route("/api/records/:id/fields", get(api::list_fields))
        .route("/api/records/:id/fields/:field/first-pass", post(api::first_pass))
        .route("/api/records/:id/fields/:field/second-pass", post(api::second_pass))
        .route(
            "/api/records/:id/issues",
            get(api::list_issues).post(api::raise_issue),
        )
        .route(
            "/api/records/:id/disputes",
            get(api::list_disputes).post(api::raise_dispute),
        )
        .route(
            "/api/records/:id/quotes",
            get(api::list_quotes).post(api::add_quote),
        );

    let blockers_and_quotes = Router::new()
        .route("/api/issues/:id/resolve", post(api::resolve_issue))
        .route("/api/disputes/:id/resolve", post(api::resolve_dispute))
        .route(
            "/api/quotes/:id",
            axum::routing::patch(api::update_quote).delete(api::delete_quote),
        )
        .route("/api/queue", get(api::get_queue));

    let public = Router::new()
        .route("/events", get(api::event_stream))
        .merge(api::health_routes());

    Router::new()
        .merge(records)
        .merge(blockers_and_quotes)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
