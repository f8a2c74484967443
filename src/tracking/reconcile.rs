//! Clock arithmetic for reconciling the local tick counter, the native
//! tracker's counter and the server's timesheet start time.

use chrono::{DateTime, Utc};

/// Rewrites a server timestamp into RFC 3339: a space date/time separator
/// becomes `T` and a missing zone is read as UTC.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let iso_like = if trimmed.contains('T') {
        trimmed.to_string()
    } else {
        trimmed.replacen(' ', "T", 1)
    };

    if has_zone_suffix(&iso_like) {
        Some(iso_like)
    } else {
        Some(format!("{iso_like}Z"))
    }
}

/// `Z`, `+hh:mm`, `+hhmm` (or the `-` forms) at the end of the string.
fn has_zone_suffix(value: &str) -> bool {
    if value.ends_with(['Z', 'z']) {
        return true;
    }

    let bytes = value.as_bytes();
    let is_sign = |b: u8| b == b'+' || b == b'-';
    let all_digits = |slice: &[u8]| slice.iter().all(u8::is_ascii_digit);

    let with_colon = bytes.len() >= 6 && {
        let tail = &bytes[bytes.len() - 6..];
        is_sign(tail[0]) && all_digits(&tail[1..3]) && tail[3] == b':' && all_digits(&tail[4..])
    };
    let without_colon = bytes.len() >= 5 && {
        let tail = &bytes[bytes.len() - 5..];
        is_sign(tail[0]) && all_digits(&tail[1..])
    };

    with_colon || without_colon
}

pub fn parse_start_time(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = normalize_timestamp(raw)?;
    DateTime::parse_from_rfc3339(&normalized)
        .or_else(|_| DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .or_else(|_| DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M%#z"))
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
}

/// Whole seconds from `start` to `now`, clamped at zero for clocks that disagree.
pub fn approx_elapsed(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - start).num_seconds()).unwrap_or(0)
}

/// Server-derived elapsed seconds, or `previous` when the start time is
/// missing or cannot be parsed.
pub fn server_elapsed(start_time: Option<&str>, now: DateTime<Utc>, previous: u64) -> u64 {
    start_time
        .and_then(parse_start_time)
        .map(|start| approx_elapsed(start, now))
        .unwrap_or(previous)
}

/// Picks the elapsed value to publish after a restore.
///
/// The native counter wins when it is at least the server's figure; the
/// server's figure wins when native is unavailable or behind. The result is
/// never below `server_elapsed`.
pub fn reconcile(server_elapsed: u64, native_elapsed: Option<u64>) -> u64 {
    match native_elapsed {
        Some(native) if native >= server_elapsed => native,
        _ => server_elapsed,
    }
}

/// Value the local counter should snap to, if native leads it by more than `threshold`.
pub fn drift_correction(local: u64, native: u64, threshold: u64) -> Option<u64> {
    (native > local.saturating_add(threshold)).then_some(native)
}
