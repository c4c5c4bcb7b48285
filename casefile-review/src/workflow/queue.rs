//! Queue selector
//!
//! Read-only projection of records an actor may pick up next. Lock state is
//! included so a UI can show who already holds a record without another call.

use casefile_common::time;
use casefile_common::{Actor, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::ledger::FieldLedger;
use super::policy::{authorize, Operation};
use crate::db::RecordRepository;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{LockInfo, Record, RecordId, RecordStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStage {
    NeedsClaim,
    NeedsFirstReview,
    NeedsSecondReview,
    NeedsValidation,
}

impl QueueStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStage::NeedsClaim => "needs_claim",
            QueueStage::NeedsFirstReview => "needs_first_review",
            QueueStage::NeedsSecondReview => "needs_second_review",
            QueueStage::NeedsValidation => "needs_validation",
        }
    }

    /// Record status this stage draws from
    pub fn status(&self) -> RecordStatus {
        match self {
            QueueStage::NeedsClaim => RecordStatus::Pending,
            QueueStage::NeedsFirstReview => RecordStatus::FirstReview,
            QueueStage::NeedsSecondReview => RecordStatus::SecondReview,
            QueueStage::NeedsValidation => RecordStatus::FirstValidation,
        }
    }

    fn operation(&self) -> Operation {
        match self {
            QueueStage::NeedsClaim => Operation::ViewClaimQueue,
            _ => Operation::ViewReviewQueue,
        }
    }
}

impl fmt::Display for QueueStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStage {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs_claim" => Ok(QueueStage::NeedsClaim),
            "needs_first_review" => Ok(QueueStage::NeedsFirstReview),
            "needs_second_review" => Ok(QueueStage::NeedsSecondReview),
            "needs_validation" => Ok(QueueStage::NeedsValidation),
            other => Err(WorkflowError::InvalidInput(format!("Unknown queue stage: {}", other))),
        }
    }
}

/// One queue entry
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub id: RecordId,
    pub status: RecordStatus,
    pub review_cycle: i64,
    pub submitted_by: Option<UserId>,
    pub submitted_at: DateTime<Utc>,
    pub lock: Option<LockInfo>,
    pub locked_by_other: bool,
    pub fields_needing_review: i64,
    pub fields_verified: i64,
}

/// True if `actor` played an earlier role on the record
fn is_own(record: &Record, actor: &Actor) -> bool {
    record.prior_role_of(actor.user_id).is_some()
}

#[derive(Clone)]
pub struct QueueSelector {
    repo: RecordRepository,
    ledger: FieldLedger,
}

impl QueueSelector {
    pub fn new(repo: RecordRepository, ledger: FieldLedger) -> Self {
        Self { repo, ledger }
    }

    /// Records at `stage` the actor may act on, newest submission first
    ///
    /// Records the actor submitted or already reviewed are left out unless
    /// the actor is admin or passes `include_own`.
    pub async fn next_eligible(
        &self,
        actor: &Actor,
        stage: QueueStage,
        include_own: bool,
    ) -> WorkflowResult<Vec<RecordSummary>> {
        self.next_eligible_at(actor, stage, include_own, time::now()).await
    }

    pub async fn next_eligible_at(
        &self,
        actor: &Actor,
        stage: QueueStage,
        include_own: bool,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Vec<RecordSummary>> {
        authorize(actor, stage.operation())?;
        let keep_own = include_own || actor.is_admin();

        let records = self.repo.list_by_status(stage.status()).await?;
        let total = records.len();

        let mut summaries = Vec::new();
        for record in records {
            if !keep_own && is_own(&record, actor) {
                continue;
            }

            let ledger = self.ledger.summary_for(&record).await?;
            let lock = record
                .live_lock(now)
                .map(|l| LockInfo::from_state(record.id, l, now));
            let locked_by_other = lock.as_ref().is_some_and(|l| l.locked_by != actor.user_id);

            summaries.push(RecordSummary {
                id: record.id,
                status: record.status,
                review_cycle: record.review_cycle,
                submitted_by: record.submitted_by,
                submitted_at: record.submitted_at,
                lock,
                locked_by_other,
                fields_needing_review: ledger.fields_needing_review,
                fields_verified: ledger.fields_verified,
            });
        }

        debug!(
            actor = actor.user_id,
            stage = %stage,
            total,
            eligible = summaries.len(),
            "Queue selected"
        );
        Ok(summaries)
    }
}
