//! Audit trail entries

use casefile_common::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::RecordId;

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Submitted,
    Resubmitted,
    LockAcquired,
    LockExtended,
    LockTakenOver,
    LockReleased,
    StatusChanged,
    FieldFirstPass,
    FieldSecondPass,
    FieldDriftReset,
    IssueRaised,
    IssueResolved,
    DisputeRaised,
    DisputeResolved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Submitted => "submitted",
            EventKind::Resubmitted => "resubmitted",
            EventKind::LockAcquired => "lock_acquired",
            EventKind::LockExtended => "lock_extended",
            EventKind::LockTakenOver => "lock_taken_over",
            EventKind::LockReleased => "lock_released",
            EventKind::StatusChanged => "status_changed",
            EventKind::FieldFirstPass => "field_first_pass",
            EventKind::FieldSecondPass => "field_second_pass",
            EventKind::FieldDriftReset => "field_drift_reset",
            EventKind::IssueRaised => "issue_raised",
            EventKind::IssueResolved => "issue_resolved",
            EventKind::DisputeRaised => "dispute_raised",
            EventKind::DisputeResolved => "dispute_resolved",
        }
    }
}

/// One row of a record's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEvent {
    pub id: i64,
    pub record_id: RecordId,
    pub kind: String,
    pub actor: Option<UserId>,
    pub from_status: Option<String>,
    pub to_status: Option<String>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}
