//! Validation issues and verification disputes
//!
//! Both are independent of record status. Only approval consults them.

use casefile_common::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RecordId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub id: Uuid,
    pub record_id: RecordId,
    pub field_type: String,
    pub field_name: String,
    pub issue_reason: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl ValidationIssue {
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

impl DisputeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationDispute {
    pub id: Uuid,
    pub record_id: RecordId,
    pub field_name: Option<String>,
    pub raised_by: UserId,
    pub dispute_type: String,
    pub description: String,
    pub resolution_status: DisputeStatus,
    pub resolution: Option<String>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Unresolved blockers for one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenBlockers {
    pub open_issues: i64,
    pub open_disputes: i64,
}

impl OpenBlockers {
    pub fn any(&self) -> bool {
        self.open_issues > 0 || self.open_disputes > 0
    }
}
