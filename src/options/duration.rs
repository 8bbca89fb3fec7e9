//! Query-window durations: the `10m`/`1h30m` duration grammar and the
//! per-namespace clamp.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use regex::Regex;

use crate::error::GraphError;

/// Parse a duration such as `500ms`, `90s`, `10m`, `1h30m`.
///
/// Malformed input is an error; callers decide whether to fall back to a
/// default.
pub fn parse_duration(s: &str) -> Result<Duration, GraphError> {
    let bad = || GraphError::bad_request(format!("cannot parse duration [{s}]"));

    let whole = Regex::new(r"^(?:[0-9]+(?:\.[0-9]+)?(?:ms|s|m|h))+$").map_err(|_| bad())?;
    if s.is_empty() || !whole.is_match(s) {
        return Err(bad());
    }

    let part = Regex::new(r"([0-9]+(?:\.[0-9]+)?)(ms|s|m|h)").map_err(|_| bad())?;
    let mut secs = 0.0f64;
    for caps in part.captures_iter(s) {
        let value: f64 = caps[1].parse().map_err(|_| bad())?;
        secs += match &caps[2] {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return Err(bad()),
        };
    }
    Ok(Duration::from_secs_f64(secs))
}

/// Clamp the requested window so it never reaches back before the namespace
/// existed: the effective duration is `min(requested, reference − creation)`,
/// where the reference is the query time, or now when the query time is zero.
/// Recomputed independently per namespace.
pub fn resolve_namespace_duration(
    creation: Option<i64>,
    requested: Duration,
    query_time: i64,
) -> Duration {
    let Some(created) = creation else {
        return requested;
    };

    let reference = if query_time != 0 {
        query_time
    } else {
        now_unix()
    };

    let lifetime = reference - created;
    if lifetime < 0 {
        return Duration::ZERO;
    }
    requested.min(Duration::from_secs(lifetime as u64))
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
