//! Record store access layer
//!
//! The workflow components never issue SQL directly. Every concurrency-critical
//! write here is a single conditional UPDATE (compare-and-swap against the
//! state the caller observed); callers inspect the returned flag and re-read on
//! a miss.

pub mod blockers;
pub mod events;
pub mod quotes;
pub mod records;
pub mod verifications;

pub use records::{LockSwap, RecordRepository, StageStamp, StatusTransition};

use chrono::{DateTime, Utc};

/// Wrap a column conversion failure as a sqlx decode error
pub(crate) fn decode_error<E>(e: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(e))
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    casefile_common::time::from_db(value).map_err(decode_error)
}

pub(crate) fn parse_ts_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    casefile_common::time::from_db_opt(value).map_err(decode_error)
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(value: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(value).map_err(decode_error)
}
