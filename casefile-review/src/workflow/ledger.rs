//! Field verification ledger
//!
//! Tracks two independent passes per (record, field). Rows are created on the
//! first pass and only ever updated afterwards; every update is guarded by the
//! row revision.

use casefile_common::events::{EventBus, WorkflowEvent};
use casefile_common::time;
use casefile_common::{Actor, UserId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sqlx::SqliteConnection;
use tracing::{debug, info, warn};

use super::lock::lock_held;
use super::policy::{authorize, Operation};
use super::require_record;
use crate::db::events::{append_event, NewEvent};
use crate::db::verifications::{get_field, insert_field, list_fields, update_field};
use crate::db::RecordRepository;
use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    EventKind, FieldStatus, FieldVerification, LedgerSummary, Record, RecordDetails, RecordId,
    VerificationPass,
};

/// Notes and cited sources for one pass
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PassRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub source_ids: Vec<i64>,
}

impl PassRequest {
    fn into_pass(self, by: UserId, at: DateTime<Utc>) -> VerificationPass {
        VerificationPass {
            by,
            at,
            notes: self.notes,
            source_ids: self.source_ids,
        }
    }
}

/// Count ledger rows by status; detail keys with no row still need review
pub fn summarize_rows(details: &RecordDetails, rows: &[FieldVerification]) -> LedgerSummary {
    let mut summary = LedgerSummary::default();
    for row in rows {
        if row.verification_status == FieldStatus::Verified {
            summary.fields_verified += 1;
        } else {
            summary.fields_needing_review += 1;
        }
    }

    let untracked = details
        .field_names()
        .filter(|name| !rows.iter().any(|r| r.field_name == *name))
        .count();
    summary.fields_needing_review += untracked as i64;
    summary
}

fn validate_field_name(field_name: &str) -> WorkflowResult<()> {
    if field_name.trim().is_empty() {
        return Err(WorkflowError::InvalidInput("field_name must not be empty".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct FieldLedger {
    repo: RecordRepository,
    event_bus: EventBus,
}

impl FieldLedger {
    pub fn new(repo: RecordRepository, event_bus: EventBus) -> Self {
        Self { repo, event_bus }
    }

    /// Field writes are refused while another actor holds a live lock
    fn check_not_locked_by_other(
        record: &Record,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> WorkflowResult<()> {
        match record.foreign_lock(actor.user_id, now) {
            Some(lock) if !actor.is_admin() => Err(lock_held(record.id, lock, now)),
            _ => Ok(()),
        }
    }

    /// Record (or redo) the first verification pass on a field
    ///
    /// `value` defaults to the record's live value for the field. Changing
    /// the snapshot discards any second pass, since it verified the old value.
    pub async fn record_first_pass(
        &self,
        record_id: RecordId,
        field_name: &str,
        actor: &Actor,
        value: Option<Value>,
        request: PassRequest,
    ) -> WorkflowResult<FieldVerification> {
        self.record_first_pass_at(record_id, field_name, actor, value, request, time::now())
            .await
    }

    pub async fn record_first_pass_at(
        &self,
        record_id: RecordId,
        field_name: &str,
        actor: &Actor,
        value: Option<Value>,
        request: PassRequest,
        now: DateTime<Utc>,
    ) -> WorkflowResult<FieldVerification> {
        authorize(actor, Operation::RecordFieldPass)?;
        validate_field_name(field_name)?;
        let record = require_record(&self.repo, record_id).await?;
        Self::check_not_locked_by_other(&record, actor, now)?;

        let value = value.or_else(|| record.details.get(field_name).cloned());
        let pass = request.into_pass(actor.user_id, now);
        let existing = get_field(self.repo.pool(), record_id, field_name).await?;

        if let Some(row) = &existing {
            if !actor.is_admin() && row.second_verified_by() == Some(actor.user_id) {
                warn!(
                    record_id,
                    field_name,
                    actor = actor.user_id,
                    "First pass by second verifier refused"
                );
                return Err(WorkflowError::SameReviewer {
                    record_id,
                    actor: actor.user_id,
                    prior_stage: "second_pass".to_string(),
                });
            }
        }

        let mut tx = self.repo.begin().await?;
        let row = match existing {
            None => {
                let row = FieldVerification {
                    record_id,
                    field_name: field_name.to_string(),
                    field_value: value,
                    verification_status: FieldStatus::FirstReview,
                    first_pass: Some(pass),
                    second_pass: None,
                    revision: 1,
                    updated_at: now,
                };
                if !insert_field(&mut tx, &row).await? {
                    tx.rollback().await?;
                    return Err(WorkflowError::Contended { record_id });
                }
                row
            }
            Some(mut row) => {
                if row.field_value != value {
                    row.second_pass = None;
                }
                if row.second_pass.is_none() {
                    row.verification_status = FieldStatus::FirstReview;
                }
                row.field_value = value;
                row.first_pass = Some(pass);
                row.updated_at = now;

                if !update_field(&mut tx, &row).await? {
                    tx.rollback().await?;
                    return Err(WorkflowError::Contended { record_id });
                }
                row.revision += 1;
                row
            }
        };

        let audit = NewEvent::new(record_id, EventKind::FieldFirstPass, Some(actor.user_id), now)
            .with_detail(field_name);
        append_event(&mut *tx, &audit).await?;
        tx.commit().await?;

        info!(
            record_id,
            field_name,
            actor = actor.user_id,
            status = %row.verification_status,
            "Field first pass recorded"
        );
        self.emit_verified(&row, 1, actor.user_id, now);
        Ok(row)
    }

    /// Record the confirming second pass; the field becomes `verified`
    pub async fn record_second_pass(
        &self,
        record_id: RecordId,
        field_name: &str,
        actor: &Actor,
        request: PassRequest,
    ) -> WorkflowResult<FieldVerification> {
        self.record_second_pass_at(record_id, field_name, actor, request, time::now())
            .await
    }

    pub async fn record_second_pass_at(
        &self,
        record_id: RecordId,
        field_name: &str,
        actor: &Actor,
        request: PassRequest,
        now: DateTime<Utc>,
    ) -> WorkflowResult<FieldVerification> {
        authorize(actor, Operation::RecordFieldPass)?;
        validate_field_name(field_name)?;
        let record = require_record(&self.repo, record_id).await?;
        Self::check_not_locked_by_other(&record, actor, now)?;

        let mut row = get_field(self.repo.pool(), record_id, field_name)
            .await?
            .ok_or_else(|| WorkflowError::WrongState {
                record_id,
                expected: FieldStatus::FirstReview.to_string(),
                actual: FieldStatus::Pending.to_string(),
            })?;

        if row.first_pass.is_none() || row.verification_status == FieldStatus::Pending {
            return Err(WorkflowError::WrongState {
                record_id,
                expected: FieldStatus::FirstReview.to_string(),
                actual: row.verification_status.to_string(),
            });
        }

        if !actor.is_admin() && row.first_verified_by() == Some(actor.user_id) {
            warn!(
                record_id,
                field_name,
                actor = actor.user_id,
                "Second pass by first verifier refused"
            );
            return Err(WorkflowError::SameReviewer {
                record_id,
                actor: actor.user_id,
                prior_stage: "first_pass".to_string(),
            });
        }

        row.second_pass = Some(request.into_pass(actor.user_id, now));
        row.verification_status = FieldStatus::Verified;
        row.updated_at = now;

        let mut tx = self.repo.begin().await?;
        if !update_field(&mut tx, &row).await? {
            tx.rollback().await?;
            return Err(WorkflowError::Contended { record_id });
        }
        row.revision += 1;

        let audit = NewEvent::new(record_id, EventKind::FieldSecondPass, Some(actor.user_id), now)
            .with_detail(field_name);
        append_event(&mut *tx, &audit).await?;
        tx.commit().await?;

        info!(record_id, field_name, actor = actor.user_id, "Field verified");
        self.emit_verified(&row, 2, actor.user_id, now);
        Ok(row)
    }

    fn emit_verified(&self, row: &FieldVerification, pass: u8, actor: UserId, now: DateTime<Utc>) {
        self.event_bus.emit_lossy(WorkflowEvent::FieldVerified {
            record_id: row.record_id,
            field_name: row.field_name.clone(),
            pass,
            field_status: row.verification_status.to_string(),
            actor,
            timestamp: now,
        });
    }

    /// Ledger rows for a record, by field name
    pub async fn list(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> WorkflowResult<Vec<FieldVerification>> {
        authorize(actor, Operation::ViewFields)?;
        require_record(&self.repo, record_id).await?;
        Ok(list_fields(self.repo.pool(), record_id).await?)
    }

    pub async fn summarize(
        &self,
        record_id: RecordId,
        actor: &Actor,
    ) -> WorkflowResult<LedgerSummary> {
        authorize(actor, Operation::ViewFields)?;
        let record = require_record(&self.repo, record_id).await?;
        self.summary_for(&record).await
    }

    /// Summary without an authorization check, for other components
    pub(crate) async fn summary_for(&self, record: &Record) -> WorkflowResult<LedgerSummary> {
        let rows = list_fields(self.repo.pool(), record.id).await?;
        Ok(summarize_rows(&record.details, &rows))
    }

    /// Reset fields whose snapshot no longer matches `details`
    ///
    /// Runs inside the caller's transaction. Drifted rows drop back to
    /// `pending` and lose their second pass so they must be re-reviewed.
    /// Returns the names of the fields that were reset.
    pub(crate) async fn reconcile_drift(
        &self,
        conn: &mut SqliteConnection,
        record_id: RecordId,
        details: &RecordDetails,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Vec<String>> {
        let rows = list_fields(&mut *conn, record_id).await?;
        let mut reset = Vec::new();

        for mut row in rows {
            if !row.has_drifted(details.get(&row.field_name)) {
                continue;
            }
            if row.verification_status == FieldStatus::Pending && row.second_pass.is_none() {
                continue;
            }

            let previous = row.verification_status;
            row.verification_status = FieldStatus::Pending;
            row.second_pass = None;
            row.updated_at = now;

            if !update_field(&mut *conn, &row).await? {
                return Err(WorkflowError::Contended { record_id });
            }

            let audit = NewEvent::new(record_id, EventKind::FieldDriftReset, actor, now)
                .with_detail(format!("{} was {}", row.field_name, previous));
            append_event(&mut *conn, &audit).await?;

            debug!(record_id, field_name = %row.field_name, "Field reset after value drift");
            reset.push(row.field_name);
        }

        if !reset.is_empty() {
            info!(record_id, fields = ?reset, "Drifted fields reset to pending");
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(name: &str, status: FieldStatus) -> FieldVerification {
        FieldVerification {
            record_id: 1,
            field_name: name.to_string(),
            field_value: Some(json!("x")),
            verification_status: status,
            first_pass: None,
            second_pass: None,
            revision: 1,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_counts_untracked_details() {
        let mut details = RecordDetails::new();
        details.insert("victim_name", json!("A"));
        details.insert("location", json!("B"));
        details.insert("date", json!("2020-01-01"));

        let rows = vec![
            row("victim_name", FieldStatus::Verified),
            row("location", FieldStatus::FirstReview),
        ];

        let summary = summarize_rows(&details, &rows);
        assert_eq!(summary.fields_verified, 1);
        assert_eq!(summary.fields_needing_review, 2);
    }

    #[test]
    fn test_summarize_rows_without_details() {
        let rows = vec![row("orphan", FieldStatus::Pending)];
        let summary = summarize_rows(&RecordDetails::new(), &rows);
        assert_eq!(summary.fields_needing_review, 1);
        assert_eq!(summary.fields_verified, 0);
    }

    #[test]
    fn test_pass_request_defaults() {
        let request: PassRequest = serde_json::from_str("{}").unwrap();
        assert!(request.notes.is_none());
        assert!(request.source_ids.is_empty());
    }
}
