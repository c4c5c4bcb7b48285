//! Review/validation state machine
//!
//! `pending -> first_review -> second_review -> first_validation -> verified`,
//! with `reject` reachable from every non-terminal status. This module is the
//! only writer of `records.status`.
//!
//! Guards are evaluated in a fixed order: record exists, caller holds a live
//! lock, status matches, distinct-reviewer rule, open blockers. The same
//! guards are encoded in the conditional UPDATE so a concurrent change between
//! read and write cannot slip through.

use casefile_common::events::{EventBus, WorkflowEvent};
use casefile_common::time;
use casefile_common::{Actor, UserId};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::policy::{authorize, Operation};
use super::{require_record, EngineSettings};
use crate::db::blockers::count_open;
use crate::db::events::{append_event, NewEvent};
use crate::db::{RecordRepository, StageStamp, StatusTransition};
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{EventKind, Record, RecordId, RecordStatus};

/// Which earlier actors the caller must differ from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Distinct {
    Nobody,
    Submitter,
    SubmitterAndVerifier,
    AllPrior,
}

impl Distinct {
    fn actors(self, record: &Record) -> Vec<(&'static str, UserId)> {
        let limit = match self {
            Distinct::Nobody => 0,
            Distinct::Submitter => 1,
            Distinct::SubmitterAndVerifier => 2,
            Distinct::AllPrior => 3,
        };
        let wanted = ["submitter", "first_verifier", "first_validator"];
        record
            .prior_actors()
            .into_iter()
            .filter(|(role, _)| wanted[..limit].contains(role))
            .collect()
    }
}

/// One edge of the state machine
#[derive(Debug, Clone)]
struct Step {
    operation: Operation,
    /// Required current status; `None` accepts any non-terminal status
    from: Option<RecordStatus>,
    to: RecordStatus,
    stamp: StageStamp,
    distinct: Distinct,
    require_no_blockers: bool,
    release_lock: bool,
}

#[derive(Clone)]
pub struct ReviewStateMachine {
    repo: RecordRepository,
    event_bus: EventBus,
    settings: EngineSettings,
}

impl ReviewStateMachine {
    pub fn new(repo: RecordRepository, event_bus: EventBus, settings: EngineSettings) -> Self {
        Self {
            repo,
            event_bus,
            settings,
        }
    }

    /// `pending -> first_review`
    pub async fn submit_for_review(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> WorkflowResult<Record> {
        self.submit_for_review_at(record_id, actor, time::now()).await
    }

    pub async fn submit_for_review_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Record> {
        let step = Step {
            operation: Operation::SubmitForReview,
            from: Some(RecordStatus::Pending),
            to: RecordStatus::FirstReview,
            stamp: StageStamp::None,
            distinct: Distinct::Nobody,
            require_no_blockers: false,
            release_lock: false,
        };
        self.apply(record_id, actor, step, now).await
    }

    /// `first_review -> second_review`, stamping the first verifier
    pub async fn advance_to_second_review(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> WorkflowResult<Record> {
        self.advance_to_second_review_at(record_id, actor, time::now()).await
    }

    pub async fn advance_to_second_review_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Record> {
        let step = Step {
            operation: Operation::AdvanceToSecondReview,
            from: Some(RecordStatus::FirstReview),
            to: RecordStatus::SecondReview,
            stamp: StageStamp::FirstVerified,
            distinct: Distinct::Submitter,
            require_no_blockers: false,
            release_lock: false,
        };
        self.apply(record_id, actor, step, now).await
    }

    /// `second_review -> first_validation`, stamping the first validator
    pub async fn advance_to_validation(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> WorkflowResult<Record> {
        self.advance_to_validation_at(record_id, actor, time::now()).await
    }

    pub async fn advance_to_validation_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Record> {
        let step = Step {
            operation: Operation::AdvanceToValidation,
            from: Some(RecordStatus::SecondReview),
            to: RecordStatus::FirstValidation,
            stamp: StageStamp::FirstValidated,
            distinct: Distinct::SubmitterAndVerifier,
            require_no_blockers: false,
            release_lock: false,
        };
        self.apply(record_id, actor, step, now).await
    }

    /// `first_validation -> verified`; refused while issues or disputes are open
    pub async fn approve(
        &self,
        record_id: RecordId,
        actor: &Actor,
        notes: Option<String>,
    ) -> WorkflowResult<Record> {
        self.approve_at(record_id, actor, notes, time::now()).await
    }

    pub async fn approve_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Record> {
        let distinct = if self.settings.require_distinct_approver {
            Distinct::AllPrior
        } else {
            Distinct::Nobody
        };
        let step = Step {
            operation: Operation::Approve,
            from: Some(RecordStatus::FirstValidation),
            to: RecordStatus::Verified,
            stamp: StageStamp::SecondValidated { notes },
            distinct,
            require_no_blockers: true,
            release_lock: false,
        };
        self.apply(record_id, actor, step, now).await
    }

    /// Any non-terminal status `-> rejected`; releases the lock
    pub async fn reject(
        &self,
        record_id: RecordId,
        actor: &Actor,
        reason: &str,
    ) -> WorkflowResult<Record> {
        self.reject_at(record_id, actor, reason, time::now()).await
    }

    pub async fn reject_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        reason: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Record> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::InvalidInput(
                "rejection reason must not be empty".to_string(),
            ));
        }
        let step = Step {
            operation: Operation::Reject,
            from: None,
            to: RecordStatus::Rejected,
            stamp: StageStamp::Rejected {
                reason: reason.to_string(),
            },
            distinct: Distinct::Nobody,
            require_no_blockers: false,
            release_lock: true,
        };
        self.apply(record_id, actor, step, now).await
    }

    /// Take the next forward edge from the record's current status
    pub async fn advance(
        &self,
        record_id: RecordId,
        actor: &Actor,
        notes: Option<String>,
    ) -> WorkflowResult<Record> {
        self.advance_at(record_id, actor, notes, time::now()).await
    }

    pub async fn advance_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Record> {
        let record = require_record(&self.repo, record_id).await?;
        match record.status {
            RecordStatus::Pending => self.submit_for_review_at(record_id, actor, now).await,
            RecordStatus::FirstReview => {
                self.advance_to_second_review_at(record_id, actor, now)
                    .await
            }
            RecordStatus::SecondReview => {
                self.advance_to_validation_at(record_id, actor, now).await
            }
            RecordStatus::FirstValidation => self.approve_at(record_id, actor, notes, now).await,
            status @ (RecordStatus::Verified | RecordStatus::Rejected) => {
                Err(WorkflowError::WrongState {
                    record_id,
                    expected: "non-terminal status".to_string(),
                    actual: status.to_string(),
                })
            }
        }
    }

    async fn apply(
        &self,
        record_id: RecordId,
        actor: &Actor,
        step: Step,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Record> {
        authorize(actor, step.operation)?;
        let record = require_record(&self.repo, record_id).await?;
        self.check_guards(&record, actor, &step, now).await?;

        let transition = StatusTransition {
            record_id,
            from: record.status,
            to: step.to,
            actor: actor.user_id,
            now,
            stamp: step.stamp.clone(),
            require_no_blockers: step.require_no_blockers,
            release_lock: step.release_lock,
        };

        let mut tx = self.repo.begin().await?;
        if !self.repo.transition_status(&mut tx, &transition).await? {
            tx.rollback().await?;
            let fresh = require_record(&self.repo, record_id).await?;
            self.check_guards(&fresh, actor, &step, now).await?;
            return Err(WorkflowError::Contended { record_id });
        }

        let mut audit =
            NewEvent::new(record_id, EventKind::StatusChanged, Some(actor.user_id), now)
                .with_statuses(Some(record.status), step.to);
        match &step.stamp {
            StageStamp::Rejected { reason } => audit = audit.with_detail(reason.clone()),
            StageStamp::SecondValidated { notes: Some(notes) } => {
                audit = audit.with_detail(notes.clone())
            }
            _ => {}
        }
        append_event(&mut *tx, &audit).await?;

        if step.release_lock {
            let released =
                NewEvent::new(record_id, EventKind::LockReleased, Some(actor.user_id), now)
                    .with_detail(format!("released on {}", step.to));
            append_event(&mut *tx, &released).await?;
        }
        tx.commit().await?;

        info!(
            record_id,
            actor = actor.user_id,
            from = %record.status,
            to = %step.to,
            "Record status changed"
        );

        self.event_bus.emit_lossy(WorkflowEvent::StatusChanged {
            record_id,
            old_status: record.status.to_string(),
            new_status: step.to.to_string(),
            actor: actor.user_id,
            timestamp: now,
        });
        if step.release_lock {
            self.event_bus.emit_lossy(WorkflowEvent::LockReleased {
                record_id,
                actor: actor.user_id,
                timestamp: now,
            });
        }

        require_record(&self.repo, record_id).await
    }

    async fn check_guards(
        &self,
        record: &Record,
        actor: &Actor,
        step: &Step,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        let record_id = record.id;

        if !record.is_locked_by(actor.user_id, now) {
            let holder = record.live_lock(now).map(|l| l.locked_by);
            warn!(
                record_id,
                actor = actor.user_id,
                ?holder,
                operation = %step.operation,
                "Transition without lock"
            );
            return Err(WorkflowError::NotLocked {
                record_id,
                actor: actor.user_id,
                holder,
            });
        }

        match step.from {
            Some(expected) if record.status != expected => {
                return Err(WorkflowError::WrongState {
                    record_id,
                    expected: expected.to_string(),
                    actual: record.status.to_string(),
                });
            }
            None if record.status.is_terminal() => {
                return Err(WorkflowError::WrongState {
                    record_id,
                    expected: "non-terminal status".to_string(),
                    actual: record.status.to_string(),
                });
            }
            _ => {}
        }

        if !actor.is_admin() {
            if let Some((prior_stage, _)) = step
                .distinct
                .actors(record)
                .into_iter()
                .find(|(_, id)| *id == actor.user_id)
            {
                warn!(
                    record_id,
                    actor = actor.user_id,
                    prior_stage,
                    "Distinct-reviewer rule violated"
                );
                return Err(WorkflowError::SameReviewer {
                    record_id,
                    actor: actor.user_id,
                    prior_stage: prior_stage.to_string(),
                });
            }
        }

        if step.require_no_blockers {
            let blockers = count_open(self.repo.pool(), record_id).await?;
            if blockers.any() {
                return Err(WorkflowError::OpenIssues {
                    record_id,
                    open_issues: blockers.open_issues,
                    open_disputes: blockers.open_disputes,
                });
            }
        }

        Ok(())
    }
}
