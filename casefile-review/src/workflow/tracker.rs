//! Validation issues and verification disputes
//!
//! Raising or resolving a blocker never touches record status. Only approval
//! consults them.

use casefile_common::events::{EventBus, WorkflowEvent};
use casefile_common::time;
use casefile_common::Actor;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::policy::{authorize, Operation};
use super::require_record;
use crate::db::blockers;
use crate::db::events::{append_event, NewEvent};
use crate::db::RecordRepository;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    DisputeStatus, EventKind, OpenBlockers, RecordId, ValidationIssue, VerificationDispute,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewIssue {
    pub field_type: String,
    pub field_name: String,
    pub issue_reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDispute {
    #[serde(default)]
    pub field_name: Option<String>,
    pub dispute_type: String,
    pub description: String,
}

fn require_text(name: &str, value: &str) -> WorkflowResult<()> {
    if value.trim().is_empty() {
        return Err(WorkflowError::InvalidInput(format!("{} must not be empty", name)));
    }
    Ok(())
}

#[derive(Clone)]
pub struct DisputeTracker {
    repo: RecordRepository,
    event_bus: EventBus,
}

impl DisputeTracker {
    pub fn new(repo: RecordRepository, event_bus: EventBus) -> Self {
        Self { repo, event_bus }
    }

    pub async fn raise_issue(
        &self,
        record_id: RecordId,
        actor: &Actor,
        issue: NewIssue,
    ) -> WorkflowResult<ValidationIssue> {
        self.raise_issue_at(record_id, actor, issue, time::now()).await
    }

    pub async fn raise_issue_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        issue: NewIssue,
        now: DateTime<Utc>,
    ) -> WorkflowResult<ValidationIssue> {
        authorize(actor, Operation::RaiseIssue)?;
        require_text("field_type", &issue.field_type)?;
        require_text("field_name", &issue.field_name)?;
        require_text("issue_reason", &issue.issue_reason)?;
        require_record(&self.repo, record_id).await?;

        let issue = ValidationIssue {
            id: Uuid::new_v4(),
            record_id,
            field_type: issue.field_type,
            field_name: issue.field_name,
            issue_reason: issue.issue_reason,
            created_by: actor.user_id,
            created_at: now,
            resolved_by: None,
            resolved_at: None,
            resolution: None,
        };

        let mut tx = self.repo.begin().await?;
        blockers::insert_issue(&mut tx, &issue).await?;
        let audit = NewEvent::new(record_id, EventKind::IssueRaised, Some(actor.user_id), now)
            .with_detail(format!("{} {}", issue.id, issue.field_name));
        append_event(&mut *tx, &audit).await?;
        tx.commit().await?;

        info!(
            record_id,
            issue_id = %issue.id,
            field_name = %issue.field_name,
            actor = actor.user_id,
            "Validation issue raised"
        );
        self.emit_raised(record_id, "issue", issue.id, actor, now);
        Ok(issue)
    }

    pub async fn resolve_issue(
        &self,
        issue_id: Uuid,
        actor: &Actor,
        resolution: Option<String>,
    ) -> WorkflowResult<ValidationIssue> {
        self.resolve_issue_at(issue_id, actor, resolution, time::now()).await
    }

    pub async fn resolve_issue_at(
        &self,
        issue_id: Uuid,
        actor: &Actor,
        resolution: Option<String>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<ValidationIssue> {
        authorize(actor, Operation::ResolveIssue)?;
        let issue = blockers::get_issue(self.repo.pool(), issue_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("ValidationIssue", issue_id))?;
        if !issue.is_open() {
            return Err(WorkflowError::AlreadyResolved {
                entity: "ValidationIssue",
                id: issue_id.to_string(),
            });
        }

        let mut tx = self.repo.begin().await?;
        let resolved = blockers::resolve_issue(
            &mut tx,
            issue_id,
            actor.user_id,
            resolution.as_deref(),
            now,
        )
        .await?;
        if !resolved {
            tx.rollback().await?;
            return Err(WorkflowError::AlreadyResolved {
                entity: "ValidationIssue",
                id: issue_id.to_string(),
            });
        }
        let audit = NewEvent::new(
            issue.record_id,
            EventKind::IssueResolved,
            Some(actor.user_id),
            now,
        )
        .with_detail(issue_id.to_string());
        append_event(&mut *tx, &audit).await?;
        tx.commit().await?;

        info!(
            record_id = issue.record_id,
            %issue_id,
            actor = actor.user_id,
            "Validation issue resolved"
        );
        self.emit_resolved(issue.record_id, "issue", issue_id, actor, now);

        Ok(ValidationIssue {
            resolved_by: Some(actor.user_id),
            resolved_at: Some(now),
            resolution,
            ..issue
        })
    }

    pub async fn raise_dispute(
        &self,
        record_id: RecordId,
        actor: &Actor,
        dispute: NewDispute,
    ) -> WorkflowResult<VerificationDispute> {
        self.raise_dispute_at(record_id, actor, dispute, time::now()).await
    }

    pub async fn raise_dispute_at(
        &self,
        record_id: RecordId,
        actor: &Actor,
        dispute: NewDispute,
        now: DateTime<Utc>,
    ) -> WorkflowResult<VerificationDispute> {
        authorize(actor, Operation::RaiseDispute)?;
        require_text("dispute_type", &dispute.dispute_type)?;
        require_text("description", &dispute.description)?;
        require_record(&self.repo, record_id).await?;

        let dispute = VerificationDispute {
            id: Uuid::new_v4(),
            record_id,
            field_name: dispute.field_name.filter(|f| !f.trim().is_empty()),
            raised_by: actor.user_id,
            dispute_type: dispute.dispute_type,
            description: dispute.description,
            resolution_status: DisputeStatus::Open,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
        };

        let mut tx = self.repo.begin().await?;
        blockers::insert_dispute(&mut tx, &dispute).await?;
        let audit = NewEvent::new(record_id, EventKind::DisputeRaised, Some(actor.user_id), now)
            .with_detail(format!("{} {}", dispute.id, dispute.dispute_type));
        append_event(&mut *tx, &audit).await?;
        tx.commit().await?;

        info!(
            record_id,
            dispute_id = %dispute.id,
            actor = actor.user_id,
            "Verification dispute raised"
        );
        self.emit_raised(record_id, "dispute", dispute.id, actor, now);
        Ok(dispute)
    }

    pub async fn resolve_dispute(
        &self,
        dispute_id: Uuid,
        actor: &Actor,
        resolution: &str,
    ) -> WorkflowResult<VerificationDispute> {
        self.resolve_dispute_at(dispute_id, actor, resolution, time::now()).await
    }

    pub async fn resolve_dispute_at(
        &self,
        dispute_id: Uuid,
        actor: &Actor,
        resolution: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<VerificationDispute> {
        authorize(actor, Operation::ResolveDispute)?;
        require_text("resolution", resolution)?;
        let dispute = blockers::get_dispute(self.repo.pool(), dispute_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("VerificationDispute", dispute_id))?;
        if dispute.resolution_status == DisputeStatus::Resolved {
            return Err(WorkflowError::AlreadyResolved {
                entity: "VerificationDispute",
                id: dispute_id.to_string(),
            });
        }

        let mut tx = self.repo.begin().await?;
        if !blockers::resolve_dispute(&mut tx, dispute_id, actor.user_id, resolution, now).await? {
            tx.rollback().await?;
            return Err(WorkflowError::AlreadyResolved {
                entity: "VerificationDispute",
                id: dispute_id.to_string(),
            });
        }
        let audit = NewEvent::new(
            dispute.record_id,
            EventKind::DisputeResolved,
            Some(actor.user_id),
            now,
        )
        .with_detail(dispute_id.to_string());
        append_event(&mut *tx, &audit).await?;
        tx.commit().await?;

        info!(
            record_id = dispute.record_id,
            %dispute_id,
            actor = actor.user_id,
            "Verification dispute resolved"
        );
        self.emit_resolved(dispute.record_id, "dispute", dispute_id, actor, now);

        Ok(VerificationDispute {
            resolution_status: DisputeStatus::Resolved,
            resolution: Some(resolution.to_string()),
            resolved_by: Some(actor.user_id),
            resolved_at: Some(now),
            ..dispute
        })
    }

    /// True if any issue or dispute on the record is unresolved
    pub async fn has_open_blockers(&self, record_id: RecordId) -> WorkflowResult<bool> {
        Ok(self.open_blockers(record_id).await?.any())
    }

    pub async fn open_blockers(&self, record_id: RecordId) -> WorkflowResult<OpenBlockers> {
        Ok(blockers::count_open(self.repo.pool(), record_id).await?)
    }

    pub async fn list_issues(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> WorkflowResult<Vec<ValidationIssue>> {
        authorize(actor, Operation::ViewBlockers)?;
        require_record(&self.repo, record_id).await?;
        Ok(blockers::list_issues(self.repo.pool(), record_id).await?)
    }

    pub async fn list_disputes(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> WorkflowResult<Vec<VerificationDispute>> {
        authorize(actor, Operation::ViewBlockers)?;
        require_record(&self.repo, record_id).await?;
        Ok(blockers::list_disputes(self.repo.pool(), record_id).await?)
    }

    fn emit_raised(
        &self,
        record_id: RecordId,
        kind: &str,
        id: Uuid,
        actor: &Actor,
        now: DateTime<Utc>,
    ) {
        self.event_bus.emit_lossy(WorkflowEvent::BlockerRaised {
            record_id,
            blocker_kind: kind.to_string(),
            blocker_id: id.to_string(),
            actor: actor.user_id,
            timestamp: now,
        });
    }

    fn emit_resolved(
        &self,
        record_id: RecordId,
        kind: &str,
        id: Uuid,
        actor: &Actor,
        now: DateTime<Utc>,
    ) {
        self.event_bus.emit_lossy(WorkflowEvent::BlockerResolved {
            record_id,
            blocker_kind: kind.to_string(),
            blocker_id: id.to_string(),
            actor: actor.user_id,
            timestamp: now,
        });
    }
}
