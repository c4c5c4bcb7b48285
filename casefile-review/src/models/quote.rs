//! Evidentiary quotes supporting field verification

use casefile_common::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::RecordId;

/// A text snippet tied to one or more fields of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: Uuid,
    pub record_id: RecordId,
    pub text: String,
    pub source_id: Option<i64>,
    pub verified: bool,
    pub field_names: Vec<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
