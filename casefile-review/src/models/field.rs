//! Per-field verification ledger rows

use casefile_common::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::WorkflowError;
use crate::models::RecordId;

/// Field-level verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Pending,
    FirstReview,
    Verified,
}

impl FieldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldStatus::Pending => "pending",
            FieldStatus::FirstReview => "first_review",
            FieldStatus::Verified => "verified",
        }
    }
}

impl fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(FieldStatus::Pending),
            "first_review" => Ok(FieldStatus::FirstReview),
            "verified" => Ok(FieldStatus::Verified),
            other => Err(WorkflowError::InvalidInput(format!("Unknown field status: {}", other))),
        }
    }
}

/// One reviewer's pass over a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationPass {
    pub by: UserId,
    pub at: DateTime<Utc>,
    pub notes: Option<String>,
    pub source_ids: Vec<i64>,
}

/// Ledger row for one (record, field) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldVerification {
    pub record_id: RecordId,
    pub field_name: String,
    /// Snapshot of the field value when it was last verified
    pub field_value: Option<Value>,
    pub verification_status: FieldStatus,
    pub first_pass: Option<VerificationPass>,
    pub second_pass: Option<VerificationPass>,
    /// Bumped on every write; used for compare-and-swap updates
    pub revision: i64,
    pub updated_at: DateTime<Utc>,
}

impl FieldVerification {
    pub fn first_verified_by(&self) -> Option<UserId> {
        self.first_pass.as_ref().map(|p| p.by)
    }

    pub fn second_verified_by(&self) -> Option<UserId> {
        self.second_pass.as_ref().map(|p| p.by)
    }

    /// True if the snapshot no longer matches the live record value
    pub fn has_drifted(&self, live: Option<&Value>) -> bool {
        self.field_value.as_ref() != live
    }
}

/// Aggregate ledger counts for one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub fields_needing_review: i64,
    pub fields_verified: i64,
}
