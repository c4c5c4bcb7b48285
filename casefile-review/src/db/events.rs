//! Audit trail persistence

use casefile_common::time::to_db;
use casefile_common::UserId;
use chrono::{DateTime, Utc};
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use super::parse_ts;
use crate::models::{EventKind, RecordEvent, RecordId, RecordStatus};

/// Audit row to append
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub record_id: RecordId,
    pub kind: EventKind,
    pub actor: Option<UserId>,
    pub from_status: Option<RecordStatus>,
    pub to_status: Option<RecordStatus>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(
        record_id: RecordId,
        kind: EventKind,
        actor: Option<UserId>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id,
            kind,
            actor,
            from_status: None,
            to_status: None,
            detail: None,
            at,
        }
    }

    pub fn with_statuses(mut self, from: Option<RecordStatus>, to: RecordStatus) -> Self {
        self.from_status = from;
        self.to_status = Some(to);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

pub async fn append_event<'e, E>(executor: E, event: &NewEvent) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO record_events (record_id, kind, actor, from_status, to_status, detail, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.record_id)
    .bind(event.kind.as_str())
    .bind(event.actor)
    .bind(event.from_status.map(|s| s.as_str()))
    .bind(event.to_status.map(|s| s.as_str()))
    .bind(&event.detail)
    .bind(to_db(event.at))
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// History of a record, oldest first
pub async fn list_events(
    pool: &SqlitePool,
    record_id: RecordId,
) -> Result<Vec<RecordEvent>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, record_id, kind, actor, from_status, to_status, detail, created_at
        FROM record_events
        WHERE record_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(record_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(RecordEvent {
                id: row.try_get("id")?,
                record_id: row.try_get("record_id")?,
                kind: row.try_get("kind")?,
                actor: row.try_get("actor")?,
                from_status: row.try_get("from_status")?,
                to_status: row.try_get("to_status")?,
                detail: row.try_get("detail")?,
                created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
            })
        })
        .collect()
}
