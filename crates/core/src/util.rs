use chrono::{DateTime, SecondsFormat, Utc};
use ulid::Ulid;

/// Current wall-clock time in UTC.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Generates a new record key.
pub fn new_id() -> String {
    Ulid::new().to_string()
}

/// Formats a timestamp as `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub fn iso_millis(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
