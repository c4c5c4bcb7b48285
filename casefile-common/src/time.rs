//! Timestamp utilities
//!
//! Timestamps are persisted as RFC 3339 UTC text with fixed millisecond
//! precision (`2026-01-02T03:04:05.678Z`). The fixed width makes SQL string
//! comparison agree with chronological order, which the lock expiry checks
//! rely on.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};

use crate::{Error, Result};

/// Current UTC time truncated to the stored precision
///
/// Truncating here keeps in-memory comparisons consistent with comparisons
/// made in SQL against stored values.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Format a timestamp for storage
pub fn to_db(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn from_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

/// Parse an optional stored timestamp
pub fn from_db_opt(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(from_db).transpose()
}

/// Whole minutes remaining until `deadline`, rounded up, never negative
pub fn minutes_remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let remaining = deadline - now;
    if remaining <= Duration::zero() {
        return 0;
    }
    let secs = remaining.num_seconds();
    (secs + 59) / 60
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
        assert_eq!(from_db(&to_db(timestamp)).unwrap(), timestamp);
    }

    #[test]
    fn test_to_db_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let fractional = whole + Duration::microseconds(678_901);
        assert_eq!(to_db(whole), "2026-01-02T03:04:05.000Z");
        assert_eq!(to_db(fractional), "2026-01-02T03:04:05.678Z");
        assert_eq!(to_db(whole).len(), to_db(fractional).len());
    }

    #[test]
    fn test_string_order_matches_time_order() {
        let earlier = Utc.with_ymd_and_hms(2026, 5, 1, 9, 59, 59).unwrap();
        let later = earlier + Duration::milliseconds(1);
        assert!(to_db(earlier) < to_db(later));
    }

    #[test]
    fn test_from_db_parses_stored_value() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        assert_eq!(from_db(&to_db(ts)).unwrap(), ts);
        assert!(from_db("yesterday").is_err());
        assert_eq!(from_db_opt(None).unwrap(), None);
    }

    #[test]
    fn test_minutes_remaining_rounds_up() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(minutes_remaining(now + Duration::minutes(30), now), 30);
        assert_eq!(minutes_remaining(now + Duration::seconds(61), now), 2);
        assert_eq!(minutes_remaining(now + Duration::seconds(1), now), 1);
        assert_eq!(minutes_remaining(now, now), 0);
        assert_eq!(minutes_remaining(now - Duration::minutes(5), now), 0);
    }
}
