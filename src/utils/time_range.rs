//! `hh:mm:ss` time-range parsing and validation for §4.6.6 bounded processing.

use crate::errors::{AppError, PipelineError};

/// Parses `hh:mm:ss` into a second offset. Accepts `h:mm:ss` and `hh:mm:ss`.
pub fn parse_hhmmss(s: &str) -> Result<f64, AppError> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 3 {
        return Err(bad_request(s));
    }

    let hours: f64 = parts[0].parse().map_err(|_| bad_request(s))?;
    let minutes: f64 = parts[1].parse().map_err(|_| bad_request(s))?;
    let seconds: f64 = parts[2].parse().map_err(|_| bad_request(s))?;

    if minutes >= 60.0 || seconds >= 60.0 || hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return Err(bad_request(s));
    }

    Ok(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn bad_request(raw: &str) -> AppError {
    AppError::Pipeline(PipelineError::BadRequest {
        message: format!("invalid time value '{raw}', expected hh:mm:ss"),
    })
}

/// A validated `(start, end)` pair in seconds, `start < end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start_s: f64,
    pub end_s: f64,
}

/// Parses and validates both bounds per §4.6.6: both well-formed, `start <
/// end`, and (when `duration_s` is known) within the source duration.
pub fn parse_range(
    start: &str,
    end: &str,
    duration_s: Option<f64>,
) -> Result<TimeRange, AppError> {
    let start_s = parse_hhmmss(start)?;
    let end_s = parse_hhmmss(end)?;

    if start_s >= end_s {
        return Err(AppError::Pipeline(PipelineError::BadRequest {
            message: format!("start_time ({start}) must be before end_time ({end})"),
        }));
    }

    if let Some(duration) = duration_s {
        if end_s > duration {
            return Err(AppError::Pipeline(PipelineError::BadRequest {
                message: format!(
                    "end_time ({end_s}s) exceeds source duration ({duration}s)"
                ),
            }));
        }
    }

    Ok(TimeRange { start_s, end_s })
}

impl TimeRange {
    pub fn duration_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_values() {
        assert_eq!(parse_hhmmss("00:00:05").unwrap(), 5.0);
        assert_eq!(parse_hhmmss("01:02:03").unwrap(), 3723.0);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(parse_hhmmss("5").is_err());
        assert!(parse_hhmmss("00:60:00").is_err());
        assert!(parse_hhmmss("not:a:time").is_err());
    }

    #[test]
    fn rejects_start_after_end() {
        assert!(parse_range("00:00:10", "00:00:05", None).is_err());
        assert!(parse_range("00:00:05", "00:00:05", None).is_err());
    }

    #[test]
    fn rejects_range_exceeding_duration() {
        assert!(parse_range("00:00:00", "00:01:00", Some(30.0)).is_err());
        assert!(parse_range("00:00:00", "00:00:20", Some(30.0)).is_ok());
    }
}
