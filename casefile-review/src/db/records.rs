//! Record repository
//!
//! Status and lock columns live on the record row itself so a single UPDATE
//! can check and change them atomically.

use casefile_common::time::to_db;
use casefile_common::UserId;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use super::{decode_error, parse_json, parse_ts, parse_ts_opt};
use crate::models::{
    ActorStamp, LockState, Record, RecordDetails, RecordId, RecordStatus, Rejection,
};

const RECORD_COLUMNS: &str = r#"
    id, status, review_cycle, details, submitted_by, submitted_at,
    first_verified_by, first_verified_at, first_validated_by, first_validated_at,
    second_validated_by, second_validated_at, approval_notes,
    rejection_reason, rejected_by, rejected_at,
    locked_by, locked_at, lock_expires_at, updated_at
"#;

/// Lock write guarded by the lock columns the caller observed
#[derive(Debug, Clone)]
pub struct LockSwap {
    pub record_id: RecordId,
    /// Lock columns as read before deciding; `None` if they were empty
    pub observed: Option<LockState>,
    pub holder: UserId,
    pub locked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

/// Actor stamp written alongside a status change
#[derive(Debug, Clone, PartialEq)]
pub enum StageStamp {
    None,
    FirstVerified,
    FirstValidated,
    SecondValidated { notes: Option<String> },
    Rejected { reason: String },
}

/// Status write guarded by status, live lock ownership and optionally the
/// absence of open blockers
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub record_id: RecordId,
    pub from: RecordStatus,
    pub to: RecordStatus,
    pub actor: UserId,
    pub now: DateTime<Utc>,
    pub stamp: StageStamp,
    pub require_no_blockers: bool,
    pub release_lock: bool,
}

fn actor_stamp(row: &SqliteRow, by: &str, at: &str) -> Result<Option<ActorStamp>, sqlx::Error> {
    let by: Option<UserId> = row.try_get(by)?;
    let at = parse_ts_opt(row.try_get(at)?)?;
    Ok(match (by, at) {
        (Some(by), Some(at)) => Some(ActorStamp { by, at }),
        _ => None,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<Record, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status: RecordStatus = status.parse().map_err(decode_error)?;
    let details: String = row.try_get("details")?;
    let details: RecordDetails = parse_json(&details)?;

    let rejection = match (
        row.try_get::<Option<String>, _>("rejection_reason")?,
        row.try_get::<Option<UserId>, _>("rejected_by")?,
        parse_ts_opt(row.try_get("rejected_at")?)?,
    ) {
        (Some(reason), Some(by), Some(at)) => Some(Rejection { reason, by, at }),
        _ => None,
    };

    let lock = match (
        row.try_get::<Option<UserId>, _>("locked_by")?,
        parse_ts_opt(row.try_get("lock_expires_at")?)?,
    ) {
        (Some(locked_by), Some(expires_at)) => Some(LockState {
            locked_by,
            locked_at: parse_ts_opt(row.try_get("locked_at")?)?,
            expires_at,
        }),
        _ => None,
    };

    Ok(Record {
        id: row.try_get("id")?,
        status,
        review_cycle: row.try_get("review_cycle")?,
        details,
        submitted_by: row.try_get("submitted_by")?,
        submitted_at: parse_ts(&row.try_get::<String, _>("submitted_at")?)?,
        first_verified: actor_stamp(row, "first_verified_by", "first_verified_at")?,
        first_validated: actor_stamp(row, "first_validated_by", "first_validated_at")?,
        second_validated: actor_stamp(row, "second_validated_by", "second_validated_at")?,
        approval_notes: row.try_get("approval_notes")?,
        rejection,
        lock,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn details_json(details: &RecordDetails) -> Result<String, sqlx::Error> {
    serde_json::to_string(details).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Repository over the `records` table
#[derive(Clone)]
pub struct RecordRepository {
    pool: SqlitePool,
}

impl RecordRepository {
    /// Create new repository with database pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction
    ///
    /// Callers open transactions with a write statement so SQLite takes the
    /// write lock up front instead of upgrading a read snapshot later.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Insert a freshly submitted record at `pending`
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        submitted_by: Option<UserId>,
        details: &RecordDetails,
        now: DateTime<Utc>,
    ) -> Result<RecordId, sqlx::Error> {
        let now = to_db(now);
        let result = sqlx::query(
            r#"
            INSERT INTO records (status, review_cycle, details, submitted_by, submitted_at, updated_at)
            VALUES ('pending', 0, ?, ?, ?, ?)
            "#,
        )
        .bind(details_json(details)?)
        .bind(submitted_by)
        .bind(&now)
        .bind(&now)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Load a record that has not been soft-deleted
    pub async fn get(&self, record_id: RecordId) -> Result<Option<Record>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM records WHERE id = ? AND deleted_at IS NULL",
            RECORD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Records in `status`, newest submission first
    pub async fn list_by_status(&self, status: RecordStatus) -> Result<Vec<Record>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM records WHERE status = ? AND deleted_at IS NULL \
             ORDER BY submitted_at DESC, id DESC",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Write new lock columns if they still match what the caller observed
    ///
    /// Returns false when another writer got there first.
    pub async fn compare_and_swap_lock(
        &self,
        conn: &mut SqliteConnection,
        swap: &LockSwap,
    ) -> Result<bool, sqlx::Error> {
        let observed_holder = swap.observed.as_ref().map(|l| l.locked_by);
        let observed_expiry = swap.observed.as_ref().map(|l| to_db(l.expires_at));

        let result = sqlx::query(
            r#"
            UPDATE records
            SET locked_by = ?, locked_at = ?, lock_expires_at = ?, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
              AND locked_by IS ? AND lock_expires_at IS ?
            "#,
        )
        .bind(swap.holder)
        .bind(to_db(swap.locked_at))
        .bind(to_db(swap.expires_at))
        .bind(to_db(swap.now))
        .bind(swap.record_id)
        .bind(observed_holder)
        .bind(observed_expiry)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Clear the lock columns if they still match what the caller observed
    pub async fn clear_lock(
        &self,
        conn: &mut SqliteConnection,
        record_id: RecordId,
        observed: &LockState,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET locked_by = NULL, locked_at = NULL, lock_expires_at = NULL, updated_at = ?
            WHERE id = ? AND deleted_at IS NULL
              AND locked_by = ? AND lock_expires_at = ?
            "#,
        )
        .bind(to_db(now))
        .bind(record_id)
        .bind(observed.locked_by)
        .bind(to_db(observed.expires_at))
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Apply a status transition if every guard still holds at write time
    pub async fn transition_status(
        &self,
        conn: &mut SqliteConnection,
        transition: &StatusTransition,
    ) -> Result<bool, sqlx::Error> {
        let now = to_db(transition.now);
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE records SET status = ");
        qb.push_bind(transition.to.as_str())
            .push(", updated_at = ")
            .push_bind(now.clone());

        match &transition.stamp {
            StageStamp::None => {}
            StageStamp::FirstVerified => {
                qb.push(", first_verified_by = ")
                    .push_bind(transition.actor)
                    .push(", first_verified_at = ")
                    .push_bind(now.clone());
            }
            StageStamp::FirstValidated => {
                qb.push(", first_validated_by = ")
                    .push_bind(transition.actor)
                    .push(", first_validated_at = ")
                    .push_bind(now.clone());
            }
            StageStamp::SecondValidated { notes } => {
                qb.push(", second_validated_by = ")
                    .push_bind(transition.actor)
                    .push(", second_validated_at = ")
                    .push_bind(now.clone())
                    .push(", approval_notes = ")
                    .push_bind(notes.clone());
            }
            StageStamp::Rejected { reason } => {
                qb.push(", rejection_reason = ")
                    .push_bind(reason.clone())
                    .push(", rejected_by = ")
                    .push_bind(transition.actor)
                    .push(", rejected_at = ")
                    .push_bind(now.clone());
            }
        }

        if transition.release_lock {
            qb.push(", locked_by = NULL, locked_at = NULL, lock_expires_at = NULL");
        }

        qb.push(" WHERE id = ")
            .push_bind(transition.record_id)
            .push(" AND deleted_at IS NULL AND status = ")
            .push_bind(transition.from.as_str())
            .push(" AND locked_by = ")
            .push_bind(transition.actor)
            .push(" AND lock_expires_at > ")
            .push_bind(now);

        if transition.require_no_blockers {
            qb.push(
                " AND NOT EXISTS (SELECT 1 FROM validation_issues \
                   WHERE record_id = records.id AND resolved_at IS NULL) \
                  AND NOT EXISTS (SELECT 1 FROM verification_disputes \
                   WHERE record_id = records.id AND resolution_status = 'open')",
            );
        }

        let result = qb.build().execute(&mut *conn).await?;
        Ok(result.rows_affected() == 1)
    }

    /// Re-enter a rejected record at `pending` for a new review cycle
    ///
    /// Clears every stage stamp, the rejection and any lock, and replaces the
    /// payload with the merged `details`.
    pub async fn reset_for_resubmission(
        &self,
        conn: &mut SqliteConnection,
        record_id: RecordId,
        details: &RecordDetails,
        now: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE records
            SET status = 'pending',
                review_cycle = review_cycle + 1,
                details = ?,
                first_verified_by = NULL, first_verified_at = NULL,
                first_validated_by = NULL, first_validated_at = NULL,
                second_validated_by = NULL, second_validated_at = NULL,
                approval_notes = NULL,
                rejection_reason = NULL, rejected_by = NULL, rejected_at = NULL,
                locked_by = NULL, locked_at = NULL, lock_expires_at = NULL,
                updated_at = ?
            WHERE id = ? AND deleted_at IS NULL AND status = 'rejected'
            "#,
        )
        .bind(details_json(details)?)
        .bind(to_db(now))
        .bind(record_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
