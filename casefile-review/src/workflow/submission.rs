//! Record entry points around the review pipeline
//!
//! Submission creates the record at `pending`. Resubmission is the only way
//! back out of `rejected`: it merges the new details, clears every stage
//! stamp, starts a new review cycle and resets drifted field verifications.

use casefile_common::events::{EventBus, WorkflowEvent};
use casefile_common::time;
use casefile_common::{Actor, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::ledger::FieldLedger;
use super::policy::{authorize, Operation};
use super::require_record;
use super::tracker::DisputeTracker;
use crate::db::events::{append_event, list_events, NewEvent};
use crate::db::RecordRepository;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    EventKind, LedgerSummary, LockInfo, OpenBlockers, Record, RecordDetails, RecordEvent, RecordId,
    RecordStatus,
};

/// A record with its live lock and ledger/blocker counts
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: Record,
    pub lock_info: Option<LockInfo>,
    pub ledger: LedgerSummary,
    pub blockers: OpenBlockers,
}

#[derive(Clone)]
pub struct Submissions {
    repo: RecordRepository,
    event_bus: EventBus,
    ledger: FieldLedger,
    tracker: DisputeTracker,
}

impl Submissions {
    pub fn new(
        repo: RecordRepository,
        event_bus: EventBus,
        ledger: FieldLedger,
        tracker: DisputeTracker,
    ) -> Self {
        Self {
            repo,
            event_bus,
            ledger,
            tracker,
        }
    }

    /// Create a record at `pending`; guests submit anonymously
    pub async fn submit(&self, actor: &Actor, details: RecordDetails) -> WorkflowResult<Record> {
        self.submit_at(actor, details, time::now()).await
    }

    pub async fn submit_at(
        &self,
        actor: &Actor,
        details: RecordDetails,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Record> {
        authorize(actor, Operation::Submit)?;
        let submitted_by = (actor.role != Role::Guest).then_some(actor.user_id);

        let mut tx = self.repo.begin().await?;
        let record_id = self.repo.insert(&mut tx, submitted_by, &details, now).await?;
        let audit = NewEvent::new(record_id, EventKind::Submitted, submitted_by, now)
            .with_statuses(None, RecordStatus::Pending);
        append_event(&mut *tx, &audit).await?;
        tx.commit().await?;

        info!(record_id, ?submitted_by, fields = details.len(), "Record submitted");
        self.event_bus.emit_lossy(WorkflowEvent::RecordSubmitted {
            record_id,
            submitted_by,
            timestamp: now,
        });

        require_record(&self.repo, record_id).await
    }

    /// Re-enter a rejected record at `pending` with merged details
    ///
    /// Allowed for the original submitter and for editors and above.
    pub async fn resubmit(
        &self,
        record_id: RecordId,
        actor: &Actor,
        details: RecordDetails,
    ) -> WorkflowResult<Record> {
        self.resubmit_at(record_id, actor, details, time::now()).await
    }

    pub async fn resubmit_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        details: RecordDetails,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Record> {
        authorize(actor, Operation::Resubmit)?;
        let record = require_record(&self.repo, record_id).await?;

        let is_submitter = record.submitted_by == Some(actor.user_id);
        if !is_submitter && !actor.has_at_least(Role::Editor) {
            warn!(record_id, actor = actor.user_id, "Resubmission by non-submitter refused");
            return Err(WorkflowError::Forbidden {
                role: actor.role,
                operation: Operation::Resubmit,
            });
        }
        Self::check_rejected(&record)?;

        let mut merged = record.details.clone();
        merged.merge(details);

        let mut tx = self.repo.begin().await?;
        if !self.repo.reset_for_resubmission(&mut tx, record_id, &merged, now).await? {
            tx.rollback().await?;
            let fresh = require_record(&self.repo, record_id).await?;
            Self::check_rejected(&fresh)?;
            return Err(WorkflowError::Contended { record_id });
        }

        let review_cycle = record.review_cycle + 1;
        let audit = NewEvent::new(record_id, EventKind::Resubmitted, Some(actor.user_id), now)
            .with_statuses(Some(RecordStatus::Rejected), RecordStatus::Pending)
            .with_detail(format!("review_cycle={}", review_cycle));
        append_event(&mut *tx, &audit).await?;

        let reset = self
            .ledger
            .reconcile_drift(&mut tx, record_id, &merged, Some(actor.user_id), now)
            .await?;
        tx.commit().await?;

        info!(
            record_id,
            actor = actor.user_id,
            review_cycle,
            reset_fields = reset.len(),
            "Record resubmitted"
        );
        self.event_bus.emit_lossy(WorkflowEvent::RecordResubmitted {
            record_id,
            review_cycle,
            actor: actor.user_id,
            timestamp: now,
        });

        require_record(&self.repo, record_id).await
    }

    fn check_rejected(record: &Record) -> WorkflowResult<()> {
        if record.status != RecordStatus::Rejected {
            return Err(WorkflowError::WrongState {
                record_id: record.id,
                expected: RecordStatus::Rejected.to_string(),
                actual: record.status.to_string(),
            });
        }
        Ok(())
    }

    pub async fn get(&self, record_id: RecordId, actor: &Actor) -> WorkflowResult<RecordView> {
        self.get_at(record_id, actor, time::now()).await
    }

    pub async fn get_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<RecordView> {
        authorize(actor, Operation::ViewRecord)?;
        let record = require_record(&self.repo, record_id).await?;
        let lock_info = record
            .live_lock(now)
            .map(|l| LockInfo::from_state(record_id, l, now));
        let ledger = self.ledger.summary_for(&record).await?;
        let blockers = self.tracker.open_blockers(record_id).await?;

        Ok(RecordView {
            record,
            lock_info,
            ledger,
            blockers,
        })
    }

    /// Audit trail, oldest first
    pub async fn history(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> WorkflowResult<Vec<RecordEvent>> {
        authorize(actor, Operation::ViewHistory)?;
        require_record(&self.repo, record_id).await?;
        Ok(list_events(self.repo.pool(), record_id).await?)
    }
}
