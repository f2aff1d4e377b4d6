//! Absolute expiration timestamps: RFC3339 first, then progressively looser
//! zoneless forms, all read as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unable to parse expiration time: {0}")]
pub struct ExpirationError(pub String);

pub fn parse(input: &str) -> Result<DateTime<Utc>, ExpirationError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(input) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(t.and_utc());
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M") {
        return Ok(t.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        // Date-only means midnight UTC.
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return Ok(t.and_utc());
        }
    }
    Err(ExpirationError(input.to_string()))
}
