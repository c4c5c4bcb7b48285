//! Quote persistence
//!
//! Quotes are not guarded by the record lock or status; writes are plain
//! inserts and updates. Field links are replaced wholesale on update.

use casefile_common::time::to_db;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{decode_error, parse_ts};
use crate::models::{Quote, RecordId};

fn quote_from_row(row: &SqliteRow, field_names: Vec<String>) -> Result<Quote, sqlx::Error> {
    let id: String = row.try_get("id")?;
    let verified: i64 = row.try_get("verified")?;

    Ok(Quote {
        id: Uuid::parse_str(&id).map_err(decode_error)?,
        record_id: row.try_get("record_id")?,
        text: row.try_get("quote_text")?,
        source_id: row.try_get("source_id")?,
        verified: verified != 0,
        field_names,
        created_by: row.try_get("created_by")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

async fn field_links(
    conn: &mut SqliteConnection,
    quote_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT field_name FROM quote_field_links WHERE quote_id = ? ORDER BY field_name",
    )
    .bind(quote_id)
    .fetch_all(&mut *conn)
    .await
}

async fn replace_links(
    conn: &mut SqliteConnection,
    quote_id: &str,
    field_names: &[String],
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM quote_field_links WHERE quote_id = ?")
        .bind(quote_id)
        .execute(&mut *conn)
        .await?;

    for field_name in field_names {
        sqlx::query(
            "INSERT OR IGNORE INTO quote_field_links (quote_id, field_name) VALUES (?, ?)",
        )
        .bind(quote_id)
        .bind(field_name)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Insert a quote and its field links
pub async fn insert_quote(conn: &mut SqliteConnection, quote: &Quote) -> Result<(), sqlx::Error> {
    let id = quote.id.to_string();
    sqlx::query(
        r#"
        INSERT INTO quotes (id, record_id, quote_text, source_id, verified, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(quote.record_id)
    .bind(&quote.text)
    .bind(quote.source_id)
    .bind(quote.verified as i64)
    .bind(quote.created_by)
    .bind(to_db(quote.created_at))
    .bind(to_db(quote.updated_at))
    .execute(&mut *conn)
    .await?;

    replace_links(conn, &id, &quote.field_names).await
}

pub async fn get_quote(
    conn: &mut SqliteConnection,
    quote_id: Uuid,
) -> Result<Option<Quote>, sqlx::Error> {
    let id = quote_id.to_string();
    let row = sqlx::query("SELECT * FROM quotes WHERE id = ?")
        .bind(&id)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => {
            let links = field_links(conn, &id).await?;
            quote_from_row(&row, links).map(Some)
        }
        None => Ok(None),
    }
}

/// Quotes for a record, oldest first, optionally only those linked to `field_name`
pub async fn list_quotes(
    pool: &SqlitePool,
    record_id: RecordId,
    field_name: Option<&str>,
) -> Result<Vec<Quote>, sqlx::Error> {
    let mut conn = pool.acquire().await?;

    let rows = match field_name {
        Some(field) => {
            sqlx::query(
                r#"
                SELECT q.* FROM quotes q
                JOIN quote_field_links l ON l.quote_id = q.id
                WHERE q.record_id = ? AND l.field_name = ?
                ORDER BY q.created_at ASC, q.id ASC
                "#,
            )
            .bind(record_id)
            .bind(field)
            .fetch_all(&mut *conn)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM quotes WHERE record_id = ? ORDER BY created_at ASC, id ASC")
                .bind(record_id)
                .fetch_all(&mut *conn)
                .await?
        }
    };

    let mut quotes = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.try_get("id")?;
        let links = field_links(&mut conn, &id).await?;
        quotes.push(quote_from_row(row, links)?);
    }
    Ok(quotes)
}

/// Overwrite a quote's mutable columns and links; false if it no longer exists
pub async fn update_quote(conn: &mut SqliteConnection, quote: &Quote) -> Result<bool, sqlx::Error> {
    let id = quote.id.to_string();
    let result = sqlx::query(
        "UPDATE quotes SET quote_text = ?, source_id = ?, verified = ?, updated_at = ? WHERE id = ?",
    )
    .bind(&quote.text)
    .bind(quote.source_id)
    .bind(quote.verified as i64)
    .bind(to_db(quote.updated_at))
    .bind(&id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    replace_links(conn, &id, &quote.field_names).await?;
    Ok(true)
}

/// Delete a quote; links cascade
pub async fn delete_quote(
    conn: &mut SqliteConnection,
    quote_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM quotes WHERE id = ?")
        .bind(quote_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}
