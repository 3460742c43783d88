//! Timestamp utilities

use chrono::{DateTime, SecondsFormat, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC time as the RFC 3339 text stored in the database
///
/// Millisecond precision keeps lexical and chronological order identical.
pub fn now_string() -> String {
    to_db_string(now())
}

/// Format a timestamp the way the database stores it
pub fn to_db_string(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
