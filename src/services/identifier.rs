//! Post identifier derivation and the fixed-precision timestamp layout.
//!
//! Identifiers are `{owner}-{title}-{unix seconds}` with spaces and tabs
//! folded to `_`. They are derived once, at reservation time, and every
//! object key of the post is built from them.

use crate::errors::{PostError, PostResult};
use chrono::{DateTime, NaiveDateTime, Utc};

/// UTC timestamp layout with exactly six fractional digits.
pub const TIMESTAMP_LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Current UTC time rendered in [`TIMESTAMP_LAYOUT`].
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_LAYOUT).to_string()
}

/// Parse a timestamp that must match [`TIMESTAMP_LAYOUT`] exactly.
///
/// chrono accepts a missing or shorter fraction when parsing, so the value is
/// re-rendered and compared to reject anything not in canonical form.
pub fn parse_timestamp(value: &str) -> PostResult<DateTime<Utc>> {
    let parsed = NaiveDateTime::parse_from_str(value, TIMESTAMP_LAYOUT)
        .map_err(|err| PostError::validation(format!("timestamp `{value}`: {err}")))?
        .and_utc();
    if format_timestamp(parsed) != value {
        return Err(PostError::validation(format!(
            "timestamp `{value}` is not in fixed-precision form"
        )));
    }
    Ok(parsed)
}

/// Derive the post identifier from owner, title and creation time.
pub fn generate_post_id(owner: &str, title: &str, created_at: &str) -> PostResult<String> {
    let created = parse_timestamp(created_at)?;
    let raw = format!("{owner}-{title}-{}", created.timestamp());
    Ok(raw.replace([' ', '\t'], "_"))
}
