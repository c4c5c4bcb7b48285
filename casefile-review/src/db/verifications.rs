//! Field verification ledger persistence
//!
//! Rows are created lazily on the first pass and never deleted. Updates are
//! guarded by `revision` so two reviewers cannot overwrite each other's pass.

use casefile_common::time::to_db;
use casefile_common::UserId;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqliteConnection};

use super::{decode_error, parse_json, parse_ts, parse_ts_opt};
use crate::models::{FieldStatus, FieldVerification, RecordId, VerificationPass};

const FIELD_COLUMNS: &str = r#"
    record_id, field_name, field_value, verification_status,
    first_verified_by, first_verified_at, first_notes, first_source_ids,
    second_verified_by, second_verified_at, second_notes, second_source_ids,
    revision, updated_at
"#;

fn pass_from_row(row: &SqliteRow, prefix: &str) -> Result<Option<VerificationPass>, sqlx::Error> {
    let by: Option<UserId> = row.try_get(format!("{}_verified_by", prefix).as_str())?;
    let at = parse_ts_opt(row.try_get(format!("{}_verified_at", prefix).as_str())?)?;
    let (Some(by), Some(at)) = (by, at) else {
        return Ok(None);
    };
    let source_ids: String = row.try_get(format!("{}_source_ids", prefix).as_str())?;

    Ok(Some(VerificationPass {
        by,
        at,
        notes: row.try_get(format!("{}_notes", prefix).as_str())?,
        source_ids: parse_json(&source_ids)?,
    }))
}

fn field_from_row(row: &SqliteRow) -> Result<FieldVerification, sqlx::Error> {
    let status: String = row.try_get("verification_status")?;
    let field_value: Option<String> = row.try_get("field_value")?;

    Ok(FieldVerification {
        record_id: row.try_get("record_id")?,
        field_name: row.try_get("field_name")?,
        field_value: field_value.as_deref().map(parse_json).transpose()?,
        verification_status: status.parse::<FieldStatus>().map_err(decode_error)?,
        first_pass: pass_from_row(row, "first")?,
        second_pass: pass_from_row(row, "second")?,
        revision: row.try_get("revision")?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Flattened pass columns ready for binding
struct PassColumns {
    by: Option<UserId>,
    at: Option<String>,
    notes: Option<String>,
    source_ids: String,
}

impl PassColumns {
    fn from_pass(pass: Option<&VerificationPass>) -> Result<Self, sqlx::Error> {
        Ok(match pass {
            Some(p) => Self {
                by: Some(p.by),
                at: Some(to_db(p.at)),
                notes: p.notes.clone(),
                source_ids: encode_json(&p.source_ids)?,
            },
            None => Self {
                by: None,
                at: None,
                notes: None,
                source_ids: "[]".to_string(),
            },
        })
    }
}

pub async fn get_field<'e, E>(
    executor: E,
    record_id: RecordId,
    field_name: &str,
) -> Result<Option<FieldVerification>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM field_verifications WHERE record_id = ? AND field_name = ?",
        FIELD_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(record_id)
        .bind(field_name)
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(field_from_row).transpose()
}

pub async fn list_fields<'e, E>(
    executor: E,
    record_id: RecordId,
) -> Result<Vec<FieldVerification>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {} FROM field_verifications WHERE record_id = ? ORDER BY field_name",
        FIELD_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(record_id).fetch_all(executor).await?;
    rows.iter().map(field_from_row).collect()
}

/// Insert a new ledger row; false if one already exists
pub async fn insert_field(
    conn: &mut SqliteConnection,
    field: &FieldVerification,
) -> Result<bool, sqlx::Error> {
    let first = PassColumns::from_pass(field.first_pass.as_ref())?;
    let second = PassColumns::from_pass(field.second_pass.as_ref())?;
    let value = field.field_value.as_ref().map(encode_json).transpose()?;

    let result = sqlx::query(
        r#"
        INSERT INTO field_verifications (
            record_id, field_name, field_value, verification_status,
            first_verified_by, first_verified_at, first_notes, first_source_ids,
            second_verified_by, second_verified_at, second_notes, second_source_ids,
            revision, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)
        ON CONFLICT(record_id, field_name) DO NOTHING
        "#,
    )
    .bind(field.record_id)
    .bind(&field.field_name)
    .bind(value)
    .bind(field.verification_status.as_str())
    .bind(first.by)
    .bind(first.at)
    .bind(first.notes)
    .bind(first.source_ids)
    .bind(second.by)
    .bind(second.at)
    .bind(second.notes)
    .bind(second.source_ids)
    .bind(to_db(field.updated_at))
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Overwrite a ledger row if its revision is still `field.revision`
///
/// The stored revision becomes `field.revision + 1` on success.
pub async fn update_field(
    conn: &mut SqliteConnection,
    field: &FieldVerification,
) -> Result<bool, sqlx::Error> {
    let first = PassColumns::from_pass(field.first_pass.as_ref())?;
    let second = PassColumns::from_pass(field.second_pass.as_ref())?;
    let value = field.field_value.as_ref().map(encode_json).transpose()?;

    let result = sqlx::query(
        r#"
        UPDATE field_verifications
        SET field_value = ?, verification_status = ?,
            first_verified_by = ?, first_verified_at = ?, first_notes = ?, first_source_ids = ?,
            second_verified_by = ?, second_verified_at = ?, second_notes = ?, second_source_ids = ?,
            revision = revision + 1, updated_at = ?
        WHERE record_id = ? AND field_name = ? AND revision = ?
        "#,
    )
    .bind(value)
    .bind(field.verification_status.as_str())
    .bind(first.by)
    .bind(first.at)
    .bind(first.notes)
    .bind(first.source_ids)
    .bind(second.by)
    .bind(second.at)
    .bind(second.notes)
    .bind(second.source_ids)
    .bind(to_db(field.updated_at))
    .bind(field.record_id)
    .bind(&field.field_name)
    .bind(field.revision)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}
