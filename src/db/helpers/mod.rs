use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

/// Fixed-width UTC timestamps so that lexicographic order in SQLite matches
/// chronological order.
pub fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).with_context(|| format!("failed to parse {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formatted_timestamps_sort_chronologically() {
        let whole = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(500);
        assert!(format_datetime(whole) < format_datetime(fractional));
        assert_eq!(format_datetime(whole), "2025-01-02T03:04:05.000Z");
    }

    #[test]
    fn datetimes_round_trip_through_text() {
        let value = Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap();
        let parsed = parse_datetime(&format_datetime(value), "timestamp").unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn negative_counts_are_rejected() {
        assert!(to_u64(-1, "count").is_err());
        assert_eq!(to_u64(3, "count").unwrap(), 3);
    }
}
