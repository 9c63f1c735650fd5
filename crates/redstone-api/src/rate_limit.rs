//! `Retry-After` header handling
//!
//! The server may answer 429 (and occasionally 503) with a `Retry-After`
//! header, either as delta-seconds or as an HTTP-date.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::warn;

/// Upper bound honoured for an HTTP-date `Retry-After`
const MAX_RETRY_AFTER_SECS: u64 = 3600;

/// Parses a `Retry-After` value (delta-seconds or RFC 2822 date)
///
/// Returns `default` when the value is unparseable, lies in the past or is
/// more than an hour away.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let target = date.with_timezone(&chrono::Utc);
        let now = chrono::Utc::now();
        if target > now {
            if let Some(secs) = (target - now)
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= MAX_RETRY_AFTER_SECS)
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

/// Reads `Retry-After` from a response's headers, if present
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let parsed = parse_retry_after(value, Duration::ZERO);
    (!parsed.is_zero()).then_some(parsed)
}
