//! Record: the unit of work moving through the verification pipeline

use casefile_common::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::WorkflowError;

pub type RecordId = i64;

/// Review/validation status
///
/// Main path: `pending → first_review → second_review → first_validation → verified`.
/// `rejected` is reachable from every non-terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    FirstReview,
    SecondReview,
    FirstValidation,
    Verified,
    Rejected,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::FirstReview => "first_review",
            RecordStatus::SecondReview => "second_review",
            RecordStatus::FirstValidation => "first_validation",
            RecordStatus::Verified => "verified",
            RecordStatus::Rejected => "rejected",
        }
    }

    /// `verified` and `rejected` end the current review cycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordStatus::Verified | RecordStatus::Rejected)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecordStatus::Pending),
            "first_review" => Ok(RecordStatus::FirstReview),
            "second_review" => Ok(RecordStatus::SecondReview),
            "first_validation" => Ok(RecordStatus::FirstValidation),
            "verified" => Ok(RecordStatus::Verified),
            "rejected" => Ok(RecordStatus::Rejected),
            other => Err(WorkflowError::InvalidInput(format!("Unknown record status: {}", other))),
        }
    }
}

/// Arbitrary record payload as a typed key-value map
///
/// Merging is shallow: a later write replaces the whole value stored under a
/// key. Keys written as `null` are removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordDetails(BTreeMap<String, Value>);

impl RecordDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field_name: &str) -> Option<&Value> {
        self.0.get(field_name)
    }

    pub fn insert(&mut self, field_name: impl Into<String>, value: Value) {
        self.0.insert(field_name.into(), value);
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Apply `later` on top of `self`, later values winning per key
    pub fn merge(&mut self, later: RecordDetails) {
        for (key, value) in later.0 {
            if value.is_null() {
                self.0.remove(&key);
            } else {
                self.0.insert(key, value);
            }
        }
    }
}

impl From<BTreeMap<String, Value>> for RecordDetails {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Who performed a stage and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorStamp {
    pub by: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub reason: String,
    pub by: UserId,
    pub at: DateTime<Utc>,
}

/// Raw lock columns as stored; may be expired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    pub locked_by: UserId,
    pub locked_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl LockState {
    /// Expiry is evaluated lazily: a lock is live until a read observes
    /// `expires_at <= now`. Nothing sweeps expired locks.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Lock view returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub record_id: RecordId,
    pub locked_by: UserId,
    pub locked_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub remaining_minutes: i64,
}

impl LockInfo {
    pub fn from_state(record_id: RecordId, state: &LockState, now: DateTime<Utc>) -> Self {
        Self {
            record_id,
            locked_by: state.locked_by,
            locked_at: state.locked_at,
            expires_at: state.expires_at,
            remaining_minutes: casefile_common::time::minutes_remaining(state.expires_at, now),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub status: RecordStatus,
    pub review_cycle: i64,
    pub details: RecordDetails,
    pub submitted_by: Option<UserId>,
    pub submitted_at: DateTime<Utc>,
    pub first_verified: Option<ActorStamp>,
    pub first_validated: Option<ActorStamp>,
    pub second_validated: Option<ActorStamp>,
    pub approval_notes: Option<String>,
    pub rejection: Option<Rejection>,
    pub lock: Option<LockState>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// The lock, if one is held and not yet expired at `now`
    pub fn live_lock(&self, now: DateTime<Utc>) -> Option<&LockState> {
        self.lock.as_ref().filter(|l| l.is_live(now))
    }

    pub fn is_locked_by(&self, user_id: UserId, now: DateTime<Utc>) -> bool {
        self.live_lock(now).is_some_and(|l| l.locked_by == user_id)
    }

    /// Live lock held by someone other than `user_id`
    pub fn foreign_lock(&self, user_id: UserId, now: DateTime<Utc>) -> Option<&LockState> {
        self.live_lock(now).filter(|l| l.locked_by != user_id)
    }

    pub fn first_verified_by(&self) -> Option<UserId> {
        self.first_verified.as_ref().map(|s| s.by)
    }

    pub fn first_validated_by(&self) -> Option<UserId> {
        self.first_validated.as_ref().map(|s| s.by)
    }

    /// Earlier-stage actors with the role they played, in pipeline order
    pub fn prior_actors(&self) -> Vec<(&'static str, UserId)> {
        let mut actors = Vec::with_capacity(3);
        if let Some(id) = self.submitted_by {
            actors.push(("submitter", id));
        }
        if let Some(id) = self.first_verified_by() {
            actors.push(("first_verifier", id));
        }
        if let Some(id) = self.first_validated_by() {
            actors.push(("first_validator", id));
        }
        actors
    }

    /// Role `user_id` already played on this record, if any
    pub fn prior_role_of(&self, user_id: UserId) -> Option<&'static str> {
        self.prior_actors()
            .into_iter()
            .find(|(_, id)| *id == user_id)
            .map(|(role, _)| role)
    }
}
