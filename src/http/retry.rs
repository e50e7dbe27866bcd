//! Server-advised backoff from `Retry-After`.
//!
//! The header carries either delay-seconds or an HTTP-date
//! (RFC 9110 §10.2.3). Only error responses are honoured; redirects with
//! `Retry-After` are left to the caller.

use std::time::Duration;
use time::format_description::well_known::Rfc2822;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Applied to `429 Too Many Requests` when the server gives no usable hint.
pub const DEFAULT_TOO_MANY_REQUESTS_BACKOFF: Duration = Duration::from_secs(1);

/// Longest backoff a server can impose. Larger hints are clamped.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Compute how long to hold off further requests to the host that produced
/// a response with status `code`, given its `Retry-After` value.
pub fn backoff_for_response(
    code: u16,
    retry_after: Option<&str>,
    now: OffsetDateTime,
) -> Option<Duration> {
    if code < 400 {
        return None;
    }

    let advised = retry_after
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| parse_retry_after(v, now));

    match advised {
        Some(d) => Some(d),
        None if code == 429 => Some(DEFAULT_TOO_MANY_REQUESTS_BACKOFF),
        None => None,
    }
}

fn parse_retry_after(value: &str, now: OffsetDateTime) -> Option<Duration> {
    if let Ok(seconds) = value.parse::<i64>() {
        if seconds > 0 {
            return Some(Duration::from_secs(seconds as u64).min(MAX_RETRY_AFTER));
        }
    }

    let when = parse_http_date(value)?;
    if when <= now {
        return None;
    }
    Some(
        Duration::try_from(when - now)
            .unwrap_or(MAX_RETRY_AFTER)
            .min(MAX_RETRY_AFTER),
    )
}

/// Parse an IMF-fixdate such as `Sun, 06 Nov 1994 08:49:37 GMT`, falling
/// back to general RFC 2822 syntax with a numeric zone.
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    let imf = time::format_description::parse(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT",
    )
    .ok()?;

    if let Ok(t) = PrimitiveDateTime::parse(value, &imf) {
        return Some(t.assume_utc());
    }
    OffsetDateTime::parse(value, &Rfc2822).ok()
}
