//! Error types for the workflow engine
//!
//! Every guard violation is a typed, non-retryable failure carrying enough
//! detail for a UI to explain why the caller was blocked. Only storage
//! failures and lost compare-and-swap races may be retried.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use casefile_common::{Role, UserId};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use crate::models::RecordId;
use crate::workflow::policy::Operation;

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Another actor holds an unexpired lock (423)
    #[error("Record {record_id} is locked by user {holder} for another {remaining_minutes} minute(s)")]
    LockHeld {
        record_id: RecordId,
        holder: UserId,
        expires_at: DateTime<Utc>,
        remaining_minutes: i64,
    },

    /// Release attempted by someone who does not own the lock (403)
    #[error("User {actor} does not own the lock on record {record_id}")]
    NotLockOwner {
        record_id: RecordId,
        actor: UserId,
        holder: Option<UserId>,
    },

    /// Transition attempted without holding a live lock (409)
    #[error("User {actor} must hold a live lock on record {record_id}")]
    NotLocked {
        record_id: RecordId,
        actor: UserId,
        holder: Option<UserId>,
    },

    /// Transition attempted from an invalid status (409)
    #[error("Record {record_id} is {actual}, expected {expected}")]
    WrongState {
        record_id: RecordId,
        expected: String,
        actual: String,
    },

    /// Distinct-reviewer invariant violated (409)
    #[error("User {actor} already acted on record {record_id} as {prior_stage}")]
    SameReviewer {
        record_id: RecordId,
        actor: UserId,
        prior_stage: String,
    },

    /// Unresolved issues or disputes block approval (409)
    #[error("Record {record_id} has {open_issues} open issue(s) and {open_disputes} open dispute(s)")]
    OpenIssues {
        record_id: RecordId,
        open_issues: i64,
        open_disputes: i64,
    },

    /// Record, field, issue, dispute or quote missing (404)
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Role floor not met (403)
    #[error("Role {role} may not perform {operation}")]
    Forbidden { role: Role, operation: Operation },

    /// Issue or dispute resolved twice (409)
    #[error("{entity} {id} is already resolved")]
    AlreadyResolved { entity: &'static str, id: String },

    /// A concurrent writer changed the record between read and write (409)
    #[error("Record {record_id} changed concurrently; re-fetch and retry")]
    Contended { record_id: RecordId },

    /// Malformed request data (400)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage failure (503)
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// casefile-common error
    #[error(transparent)]
    Common(#[from] casefile_common::Error),
}

/// Result type for engine operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether a caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::Storage(_)
                | WorkflowError::Contended { .. }
                | WorkflowError::Common(casefile_common::Error::Database(_))
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::LockHeld { .. } => "LOCK_HELD",
            WorkflowError::NotLockOwner { .. } => "NOT_LOCK_OWNER",
            WorkflowError::NotLocked { .. } => "NOT_LOCKED",
            WorkflowError::WrongState { .. } => "WRONG_STATE",
            WorkflowError::SameReviewer { .. } => "SAME_REVIEWER",
            WorkflowError::OpenIssues { .. } => "OPEN_ISSUES",
            WorkflowError::NotFound { .. } => "NOT_FOUND",
            WorkflowError::Forbidden { .. } => "FORBIDDEN",
            WorkflowError::AlreadyResolved { .. } => "ALREADY_RESOLVED",
            WorkflowError::Contended { .. } => "CONTENDED",
            WorkflowError::InvalidInput(_) => "BAD_REQUEST",
            WorkflowError::Storage(_) => "STORAGE_UNAVAILABLE",
            WorkflowError::Common(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::LockHeld { .. } => StatusCode::LOCKED,
            WorkflowError::NotLockOwner { .. } | WorkflowError::Forbidden { .. } => {
                StatusCode::FORBIDDEN
            }
            WorkflowError::NotLocked { .. }
            | WorkflowError::WrongState { .. }
            | WorkflowError::SameReviewer { .. }
            | WorkflowError::OpenIssues { .. }
            | WorkflowError::AlreadyResolved { .. }
            | WorkflowError::Contended { .. } => StatusCode::CONFLICT,
            WorkflowError::NotFound { .. } => StatusCode::NOT_FOUND,
            WorkflowError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            WorkflowError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            WorkflowError::Common(casefile_common::Error::InvalidInput(_)) => {
                StatusCode::BAD_REQUEST
            }
            WorkflowError::Common(casefile_common::Error::Database(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            WorkflowError::Common(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Structured detail for the response body
    pub fn details(&self) -> Value {
        match self {
            WorkflowError::LockHeld {
                record_id,
                holder,
                expires_at,
                remaining_minutes,
            } => json!({
                "record_id": record_id,
                "holder": holder,
                "expires_at": expires_at,
                "remaining_minutes": remaining_minutes,
            }),
            WorkflowError::NotLockOwner {
                record_id,
                actor,
                holder,
            }
            | WorkflowError::NotLocked {
                record_id,
                actor,
                holder,
            } => json!({
                "record_id": record_id,
                "actor": actor,
                "holder": holder,
            }),
            WorkflowError::WrongState {
                record_id,
                expected,
                actual,
            } => json!({
                "record_id": record_id,
                "expected": expected,
                "actual": actual,
            }),
            WorkflowError::SameReviewer {
                record_id,
                actor,
                prior_stage,
            } => json!({
                "record_id": record_id,
                "actor": actor,
                "prior_stage": prior_stage,
            }),
            WorkflowError::OpenIssues {
                record_id,
                open_issues,
                open_disputes,
            } => json!({
                "record_id": record_id,
                "open_issues": open_issues,
                "open_disputes": open_disputes,
            }),
            WorkflowError::NotFound { entity, id }
            | WorkflowError::AlreadyResolved { entity, id } => json!({
                "entity": entity,
                "id": id,
            }),
            WorkflowError::Forbidden { role, operation } => json!({
                "role": role,
                "operation": operation,
            }),
            WorkflowError::Contended { record_id } => json!({ "record_id": record_id }),
            WorkflowError::InvalidInput(_)
            | WorkflowError::Storage(_)
            | WorkflowError::Common(_) => Value::Null,
        }
    }
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Workflow request failed: {}", self);
        }

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "retryable": self.is_retryable(),
                "details": self.details(),
            }
        }));

        (status, body).into_response()
    }
}
