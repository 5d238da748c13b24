use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeParseError {
    #[error("unrecognized date or time: {0:?}")]
    Unrecognized(String),
}

/// Normalizes flexible date/time input into a UTC timestamp.
///
/// Accepts RFC 3339 timestamps, `YYYY-MM-DD HH:MM[:SS]`, or a bare
/// `YYYY-MM-DD` date. A bare date resolves to midnight, or to the last
/// instant of the day when `prefer_end_of_day` is set. Blank input means
/// "unset" and yields `None`. All times are interpreted in UTC.
pub fn to_time(input: &str, prefer_end_of_day: bool) -> Result<Option<DateTime<Utc>>, TimeParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Some(Utc.from_utc_datetime(&naive)));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let time = if prefer_end_of_day {
            NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN)
        } else {
            NaiveTime::MIN
        };
        return Ok(Some(Utc.from_utc_datetime(&date.and_time(time))));
    }

    Err(TimeParseError::Unrecognized(input.to_string()))
}
