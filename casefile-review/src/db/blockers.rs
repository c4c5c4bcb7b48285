//! Validation issue and verification dispute persistence

use casefile_common::time::to_db;
use casefile_common::UserId;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};
use uuid::Uuid;

use super::{decode_error, parse_ts, parse_ts_opt};
use crate::models::{DisputeStatus, OpenBlockers, RecordId, ValidationIssue, VerificationDispute};

fn parse_uuid(value: &str) -> Result<Uuid, sqlx::Error> {
    Uuid::parse_str(value).map_err(decode_error)
}

fn issue_from_row(row: &SqliteRow) -> Result<ValidationIssue, sqlx::Error> {
    Ok(ValidationIssue {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        record_id: row.try_get("record_id")?,
        field_type: row.try_get("field_type")?,
        field_name: row.try_get("field_name")?,
        issue_reason: row.try_get("issue_reason")?,
        created_by: row.try_get("created_by")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: parse_ts_opt(row.try_get("resolved_at")?)?,
        resolution: row.try_get("resolution")?,
    })
}

fn dispute_from_row(row: &SqliteRow) -> Result<VerificationDispute, sqlx::Error> {
    let status: String = row.try_get("resolution_status")?;
    let resolution_status = match status.as_str() {
        "open" => DisputeStatus::Open,
        "resolved" => DisputeStatus::Resolved,
        other => {
            return Err(sqlx::Error::Decode(
                format!("unknown dispute status '{}'", other).into(),
            ))
        }
    };

    Ok(VerificationDispute {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        record_id: row.try_get("record_id")?,
        field_name: row.try_get("field_name")?,
        raised_by: row.try_get("raised_by")?,
        dispute_type: row.try_get("dispute_type")?,
        description: row.try_get("description")?,
        resolution_status,
        resolution: row.try_get("resolution")?,
        resolved_by: row.try_get("resolved_by")?,
        resolved_at: parse_ts_opt(row.try_get("resolved_at")?)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

pub async fn insert_issue(
    conn: &mut SqliteConnection,
    issue: &ValidationIssue,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO validation_issues (
            id, record_id, field_type, field_name, issue_reason, created_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(issue.id.to_string())
    .bind(issue.record_id)
    .bind(&issue.field_type)
    .bind(&issue.field_name)
    .bind(&issue.issue_reason)
    .bind(issue.created_by)
    .bind(to_db(issue.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_issue<'e, E>(
    executor: E,
    issue_id: Uuid,
) -> Result<Option<ValidationIssue>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM validation_issues WHERE id = ?")
        .bind(issue_id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(issue_from_row).transpose()
}

pub async fn list_issues<'e, E>(
    executor: E,
    record_id: RecordId,
) -> Result<Vec<ValidationIssue>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT * FROM validation_issues WHERE record_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(record_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(issue_from_row).collect()
}

/// Mark an open issue resolved; false if it was already resolved or missing
pub async fn resolve_issue(
    conn: &mut SqliteConnection,
    issue_id: Uuid,
    actor: UserId,
    resolution: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE validation_issues
        SET resolved_by = ?, resolved_at = ?, resolution = ?
        WHERE id = ? AND resolved_at IS NULL
        "#,
    )
    .bind(actor)
    .bind(to_db(now))
    .bind(resolution)
    .bind(issue_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn insert_dispute(
    conn: &mut SqliteConnection,
    dispute: &VerificationDispute,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO verification_disputes (
            id, record_id, field_name, raised_by, dispute_type, description,
            resolution_status, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, 'open', ?)
        "#,
    )
    .bind(dispute.id.to_string())
    .bind(dispute.record_id)
    .bind(&dispute.field_name)
    .bind(dispute.raised_by)
    .bind(&dispute.dispute_type)
    .bind(&dispute.description)
    .bind(to_db(dispute.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn get_dispute<'e, E>(
    executor: E,
    dispute_id: Uuid,
) -> Result<Option<VerificationDispute>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM verification_disputes WHERE id = ?")
        .bind(dispute_id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(dispute_from_row).transpose()
}

pub async fn list_disputes<'e, E>(
    executor: E,
    record_id: RecordId,
) -> Result<Vec<VerificationDispute>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT * FROM verification_disputes WHERE record_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(record_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(dispute_from_row).collect()
}

/// Mark an open dispute resolved; false if it was already resolved or missing
pub async fn resolve_dispute(
    conn: &mut SqliteConnection,
    dispute_id: Uuid,
    actor: UserId,
    resolution: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE verification_disputes
        SET resolution_status = 'resolved', resolution = ?, resolved_by = ?, resolved_at = ?
        WHERE id = ? AND resolution_status = 'open'
        "#,
    )
    .bind(resolution)
    .bind(actor)
    .bind(to_db(now))
    .bind(dispute_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Count unresolved issues and disputes for a record
pub async fn count_open<'e, E>(
    executor: E,
    record_id: RecordId,
) -> Result<OpenBlockers, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let (open_issues, open_disputes): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM validation_issues
              WHERE record_id = ?1 AND resolved_at IS NULL),
            (SELECT COUNT(*) FROM verification_disputes
              WHERE record_id = ?1 AND resolution_status = 'open')
        "#,
    )
    .bind(record_id)
    .fetch_one(executor)
    .await?;

    Ok(OpenBlockers {
        open_issues,
        open_disputes,
    })
}
