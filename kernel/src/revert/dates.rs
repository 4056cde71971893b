// Logged date values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::schema::CollaboratorError;

/// Parse a logged date: RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`
/// or unix seconds. Naive forms are read as UTC.
pub fn parse_date(field: &str, value: &Value) -> Result<DateTime<Utc>, CollaboratorError> {
    let invalid = || CollaboratorError::InvalidDate {
        field: field.to_string(),
        value: value.to_string(),
    };

    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(invalid),
        Value::String(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Ok(naive.and_utc());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}
