//! Database initialization
//!
//! Opens (creating if needed) the single authoritative SQLite store and
//! ensures every workflow table exists. Table creation is idempotent so the
//! service can restart against an existing database.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Busy timeout for lock contention between concurrent writers
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Per-connection pragmas go through the connect options so every pooled
    // connection gets them, not just the first one.
    // WAL allows concurrent readers alongside the single writer.
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all workflow tables (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_records_table(pool).await?;
    create_record_events_table(pool).await?;
    create_field_verifications_table(pool).await?;
    create_quotes_tables(pool).await?;
    create_validation_issues_table(pool).await?;
    create_verification_disputes_table(pool).await?;
    Ok(())
}

async fn create_records_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'first_review', 'second_review',
                                  'first_validation', 'verified', 'rejected')),
            review_cycle INTEGER NOT NULL DEFAULT 0 CHECK (review_cycle >= 0),
            details TEXT NOT NULL DEFAULT '{}',
            submitted_by INTEGER,
            submitted_at TEXT NOT NULL,
            first_verified_by INTEGER,
            first_verified_at TEXT,
            first_validated_by INTEGER,
            first_validated_at TEXT,
            second_validated_by INTEGER,
            second_validated_at TEXT,
            approval_notes TEXT,
            rejection_reason TEXT,
            rejected_by INTEGER,
            rejected_at TEXT,
            locked_by INTEGER,
            locked_at TEXT,
            lock_expires_at TEXT,
            deleted_at TEXT,
            updated_at TEXT NOT NULL,
            CHECK ((locked_by IS NULL) = (lock_expires_at IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_status_submitted ON records(status, submitted_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_record_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS record_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_id INTEGER NOT NULL REFERENCES records(id),
            kind TEXT NOT NULL,
            actor INTEGER,
            from_status TEXT,
            to_status TEXT,
            detail TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_record_events_record ON record_events(record_id, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_field_verifications_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS field_verifications (
            record_id INTEGER NOT NULL REFERENCES records(id),
            field_name TEXT NOT NULL,
            field_value TEXT,
            verification_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (verification_status IN ('pending', 'first_review', 'verified')),
            first_verified_by INTEGER,
            first_verified_at TEXT,
            first_notes TEXT,
            first_source_ids TEXT NOT NULL DEFAULT '[]',
            second_verified_by INTEGER,
            second_verified_at TEXT,
            second_notes TEXT,
            second_source_ids TEXT NOT NULL DEFAULT '[]',
            revision INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (record_id, field_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_quotes_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quotes (
            id TEXT PRIMARY KEY,
            record_id INTEGER NOT NULL REFERENCES records(id),
            quote_text TEXT NOT NULL,
            source_id INTEGER,
            verified INTEGER NOT NULL DEFAULT 0,
            created_by INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS quote_field_links (
            quote_id TEXT NOT NULL REFERENCES quotes(id) ON DELETE CASCADE,
            field_name TEXT NOT NULL,
            PRIMARY KEY (quote_id, field_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_validation_issues_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS validation_issues (
            id TEXT PRIMARY KEY,
            record_id INTEGER NOT NULL REFERENCES records(id),
            field_type TEXT NOT NULL,
            field_name TEXT NOT NULL,
            issue_reason TEXT NOT NULL,
            created_by INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            resolved_by INTEGER,
            resolved_at TEXT,
            resolution TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_validation_issues_open ON validation_issues(record_id, resolved_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_verification_disputes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS verification_disputes (
            id TEXT PRIMARY KEY,
            record_id INTEGER NOT NULL REFERENCES records(id),
            field_name TEXT,
            raised_by INTEGER NOT NULL,
            dispute_type TEXT NOT NULL,
            description TEXT NOT NULL,
            resolution_status TEXT NOT NULL DEFAULT 'open'
                CHECK (resolution_status IN ('open', 'resolved')),
            resolution TEXT,
            resolved_by INTEGER,
            resolved_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_verification_disputes_open ON verification_disputes(record_id, resolution_status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
