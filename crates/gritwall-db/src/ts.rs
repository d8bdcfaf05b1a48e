//! Timestamp encoding for SQLite TEXT columns.
//!
//! All timestamps are stored as UTC RFC 3339 with fixed millisecond precision
//! and a `Z` suffix, so string comparison in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

pub fn to_store(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow::anyhow!("bad timestamp '{}': {}", s, e))?
        .with_timezone(&Utc))
}

pub fn parse_opt(s: Option<&str>) -> anyhow::Result<Option<DateTime<Utc>>> {
    s.map(parse).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips() {
        let dt = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        assert_eq!(parse(&to_store(dt)).unwrap(), dt);
    }

    #[test]
    fn string_order_matches_time_order() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(5);
        let c = a + chrono::Duration::hours(1);
        assert!(to_store(a) < to_store(b));
        assert!(to_store(b) < to_store(c));
    }
}
