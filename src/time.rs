//! Time string parsing (`SS`, `MM:SS`, `HH:MM:SS`) and range validation.

use crate::error::{TrimError, TrimResult};

/// Parse a user supplied time string into seconds.
///
/// Segments are split on `:`. One segment is whole seconds, with any fraction
/// dropped. Two are `minutes:seconds` and three are `hours:minutes:seconds`;
/// their seconds keep a fractional part.
pub fn parse_time(text: &str) -> TrimResult<f64> {
    let text = text.trim();
    let malformed = || TrimError::MalformedTime(text.to_string());

    let parts = text
        .split(':')
        .map(|segment| parse_segment(segment).ok_or_else(malformed))
        .collect::<TrimResult<Vec<f64>>>()?;

    match parts.as_slice() {
        [s] => Ok(s.trunc()),
        [m, s] => Ok(m * 60.0 + s),
        [h, m, s] => Ok(h * 3600.0 + m * 60.0 + s),
        _ => Err(malformed()),
    }
}

fn parse_segment(segment: &str) -> Option<f64> {
    let segment = segment.trim();
    // f64::from_str accepts "inf", "NaN" and signs; only plain decimals are times.
    if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    segment.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Check that `start..end` is a usable range and return its duration.
pub fn validate_range(start: f64, end: f64) -> TrimResult<f64> {
    let valid = start.is_finite() && end.is_finite() && start >= 0.0 && end > start;
    if !valid {
        return Err(TrimError::InvalidRange { start, end });
    }
    Ok(end - start)
}

/// Render seconds as `HH:MM:SS`, with milliseconds when there is a fraction.
pub fn format_seconds(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (h, rem) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (m, rem) = (rem / 60_000, rem % 60_000);
    let (s, ms) = (rem / 1000, rem % 1000);
    if ms == 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{h:02}:{m:02}:{s:02}.{ms:03}")
    }
}
