//! Time range clause
//!
//! ```text
//! BETWEEN "2016-11-08 12:00:00" AND "2016-11-08 16:00:00"
//! BEFORE "2016-11-08 16:00:00" FOR 3600s
//! AFTER "2016-11-08 12:00:00" FOR 3600s
//! LAST 600s
//! ```

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use crate::query::error::{QueryError, QueryResult};

/// Absolute times are rendered quoted, in UTC
pub fn encode_time(t: &DateTime<Utc>) -> String {
    t.format("\"%Y-%m-%d %H:%M:%S\"").to_string()
}

/// Whole seconds, rounded and never less than one
pub fn encode_duration(d: &Duration) -> String {
    let secs = (d.num_milliseconds() as f64 / 1000.0).round().max(1.0) as i64;
    format!("{}s", secs)
}

/// Pick the first matching combination:
/// beginning+ending, ending+duration, beginning+duration, duration alone
pub fn encode_range(
    beginning: Option<&DateTime<Utc>>,
    ending: Option<&DateTime<Utc>>,
    duration: Option<&Duration>,
) -> Option<String> {
    match (beginning, ending, duration) {
        (Some(start), Some(end), _) => Some(format!(
            "BETWEEN {} AND {}",
            encode_time(start),
            encode_time(end)
        )),
        (_, Some(end), Some(d)) => Some(format!(
            "BEFORE {} FOR {}",
            encode_time(end),
            encode_duration(d)
        )),
        (Some(start), _, Some(d)) => Some(format!(
            "AFTER {} FOR {}",
            encode_time(start),
            encode_duration(d)
        )),
        (_, _, Some(d)) => Some(format!("LAST {}", encode_duration(d))),
        _ => None,
    }
}

/// Parse an absolute time
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD HH:MM` and
/// `YYYY-MM-DD`; naive forms are taken as UTC.
pub fn parse_time(s: &str) -> QueryResult<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| QueryError::InvalidTime(s.to_string()))
}

/// Parse a duration like `500ms`, `30s`, `10m`, `2h`, `1d`, `1w`
pub fn parse_duration(s: &str) -> QueryResult<Duration> {
    let s = s.trim().to_lowercase();
    let invalid = || {
        QueryError::InvalidDuration(format!(
            "{}. Use: 500ms, 30s, 10m, 2h, 1d, 1w",
            s
        ))
    };

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (amount, unit) = s.split_at(split);
    let amount: i64 = amount.parse().map_err(|_| invalid())?;

    let duration = match unit {
        "ms" => Duration::try_milliseconds(amount),
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => None,
    };
    duration.ok_or_else(invalid)
}
