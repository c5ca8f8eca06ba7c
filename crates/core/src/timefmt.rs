//! Duration and size formatting helpers.
//!
//! Clock strings arrive from the engine as `m:ss[.frac]` (minutes unbounded)
//! or as ffmpeg `hh:mm:ss.ff` stamps. Both fold left to right as
//! `acc * 60 + part`.

use thiserror::Error;

const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = MIB * 1024.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeParseError {
    #[error("empty time string")]
    Empty,
    #[error("invalid time component '{component}' in '{input}'")]
    InvalidComponent { input: String, component: String },
}

/// Parse a clock string into seconds.
///
/// `"12:03.5"` is 723.5 seconds, `"0:09"` is 9 and `"01:00:02.50"` is 3602.5.
pub fn parse_clock(input: &str) -> Result<f64, TimeParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimeParseError::Empty);
    }

    trimmed.split(':').try_fold(0.0_f64, |acc, part| {
        let value = part
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| TimeParseError::InvalidComponent {
                input: input.to_string(),
                component: part.to_string(),
            })?;
        Ok(acc * 60.0 + value)
    })
}

/// Format seconds as `m:ss`, flooring the seconds part.
///
/// Minutes are not wrapped into hours: 3725 seconds is `"62:05"`.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let whole = seconds.floor() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

/// Format a byte count as `MB` below one GiB and `GB` above.
pub fn format_size(bytes: u64) -> String {
    let bytes = bytes as f64;
    if bytes < GIB {
        format!("{:.2}MB", bytes / MIB)
    } else {
        format!("{:.2}GB", bytes / GIB)
    }
}
