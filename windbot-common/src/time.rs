//! Timestamp utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert fractional milliseconds to a duration
///
/// Negative and NaN inputs collapse to zero; sequence timestamps are
/// produced by clamped arithmetic, so a negative value only ever means
/// "no wait". Values too large for a `Duration` saturate to `Duration::MAX`.
pub fn millis_to_duration(millis: f64) -> Duration {
    if millis.is_nan() || millis <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(millis / 1000.0).unwrap_or(Duration::MAX)
}

/// Format seconds as `M:SS.s` (or `X.XXs` under a minute) for logs and reports
pub fn format_seconds(seconds: f64) -> String {
    let negative = seconds < 0.0;
    let abs = seconds.abs();

    let body = if abs < 60.0 {
        format!("{:.2}s", abs)
    } else {
        let minutes = (abs / 60.0).floor() as u64;
        let rest = abs - (minutes as f64) * 60.0;
        format!("{}:{:04.1}s", minutes, rest)
    };

    if negative {
        format!("-{}", body)
    } else {
        body
    }
}
