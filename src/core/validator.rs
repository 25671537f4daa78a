//! Input validation for RR interval windows.
//!
//! Runs before any feature computation. Enforces count, physiological range,
//! and window-duration constraints, and filters out-of-range values. Every
//! rejection carries a machine-readable code plus structured diagnostics so a
//! client can self-diagnose without server-side logs.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Machine-readable rejection codes. All are terminal for the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    InsufficientData,
    ExcessiveData,
    InvalidRrValues,
    InsufficientValidData,
    WindowTooShort,
    WindowTooLong,
}

impl RejectionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionCode::InsufficientData => "INSUFFICIENT_DATA",
            RejectionCode::ExcessiveData => "EXCESSIVE_DATA",
            RejectionCode::InvalidRrValues => "INVALID_RR_VALUES",
            RejectionCode::InsufficientValidData => "INSUFFICIENT_VALID_DATA",
            RejectionCode::WindowTooShort => "WINDOW_TOO_SHORT",
            RejectionCode::WindowTooLong => "WINDOW_TOO_LONG",
        }
    }
}

impl std::fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected window: code, human-readable message, structured diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub code: RejectionCode,
    pub message: String,
    pub details: serde_json::Value,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for Rejection {}

/// A validated window ready for feature extraction.
///
/// The cleaned sequence is a subsequence of the input: out-of-range values
/// are dropped, order is preserved, nothing is clamped or reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanedWindow {
    pub rr_ms: Vec<f64>,
    pub window_duration_s: f64,
}

/// Validates RR interval input for arrhythmia analysis.
#[derive(Debug, Clone)]
pub struct InputValidator {
    min_rr_count: usize,
    max_rr_count: usize,
    min_rr_value_ms: f64,
    max_rr_value_ms: f64,
    min_window_duration_s: f64,
    max_window_duration_s: f64,
}

impl InputValidator {
    pub fn new(config: &Config) -> Self {
        Self {
            min_rr_count: config.min_rr_count,
            max_rr_count: config.max_rr_count,
            min_rr_value_ms: config.min_rr_value_ms,
            max_rr_value_ms: config.max_rr_value_ms,
            min_window_duration_s: config.min_window_duration_s,
            max_window_duration_s: config.max_window_duration_s,
        }
    }

    /// Validate a raw RR window. Checks run in a fixed order and short-circuit
    /// on the first failure: count, values, post-filter sufficiency, duration.
    pub fn validate(
        &self,
        rr_ms: &[f64],
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<CleanedWindow, Rejection> {
        self.check_count(rr_ms)?;

        let cleaned = self.filter_values(rr_ms)?;

        if cleaned.len() < self.min_rr_count {
            return Err(Rejection {
                code: RejectionCode::InsufficientValidData,
                message: format!(
                    "After filtering invalid values, only {} intervals remain. \
                     Minimum required: {}",
                    cleaned.len(),
                    self.min_rr_count
                ),
                details: json!({
                    "original_count": rr_ms.len(),
                    "valid_count": cleaned.len(),
                    "minimum_required": self.min_rr_count,
                }),
            });
        }

        let window_duration_s = self.check_window(window_start, window_end)?;

        Ok(CleanedWindow {
            rr_ms: cleaned,
            window_duration_s,
        })
    }

    fn check_count(&self, rr_ms: &[f64]) -> Result<(), Rejection> {
        let count = rr_ms.len();

        if count < self.min_rr_count {
            return Err(Rejection {
                code: RejectionCode::InsufficientData,
                message: format!(
                    "Received {count} RR intervals, minimum required is {}",
                    self.min_rr_count
                ),
                details: json!({
                    "received_count": count,
                    "minimum_required": self.min_rr_count,
                }),
            });
        }

        if count > self.max_rr_count {
            return Err(Rejection {
                code: RejectionCode::ExcessiveData,
                message: format!(
                    "Received {count} RR intervals, maximum allowed is {}",
                    self.max_rr_count
                ),
                details: json!({
                    "received_count": count,
                    "maximum_allowed": self.max_rr_count,
                }),
            });
        }

        Ok(())
    }

    /// Drop out-of-range values, keeping relative order. Rejects the whole
    /// window when more than half the values are out of range.
    fn filter_values(&self, rr_ms: &[f64]) -> Result<Vec<f64>, Rejection> {
        let mut cleaned = Vec::with_capacity(rr_ms.len());
        let mut invalid_count = 0usize;
        let mut sample_invalid = Vec::new();

        for &rr in rr_ms {
            if rr >= self.min_rr_value_ms && rr <= self.max_rr_value_ms {
                cleaned.push(rr);
            } else {
                invalid_count += 1;
                if sample_invalid.len() < 5 {
                    sample_invalid.push(rr);
                }
            }
        }

        if invalid_count as f64 > rr_ms.len() as f64 * 0.5 {
            return Err(Rejection {
                code: RejectionCode::InvalidRrValues,
                message: format!(
                    "{invalid_count} of {} RR intervals are outside valid range \
                     ({}-{} ms)",
                    rr_ms.len(),
                    self.min_rr_value_ms,
                    self.max_rr_value_ms
                ),
                details: json!({
                    "invalid_count": invalid_count,
                    "total_count": rr_ms.len(),
                    "valid_range_ms": [self.min_rr_value_ms, self.max_rr_value_ms],
                    "sample_invalid_values": sample_invalid,
                }),
            });
        }

        Ok(cleaned)
    }

    fn check_window(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<f64, Rejection> {
        let duration = (window_end - window_start).num_milliseconds() as f64 / 1000.0;

        if duration < self.min_window_duration_s {
            return Err(Rejection {
                code: RejectionCode::WindowTooShort,
                message: format!(
                    "Window duration is {duration:.1} seconds, minimum required is {} seconds",
                    self.min_window_duration_s
                ),
                details: json!({
                    "window_duration_s": duration,
                    "minimum_required_s": self.min_window_duration_s,
                }),
            });
        }

        if duration > self.max_window_duration_s {
            return Err(Rejection {
                code: RejectionCode::WindowTooLong,
                message: format!(
                    "Window duration is {duration:.1} seconds, maximum allowed is {} seconds",
                    self.max_window_duration_s
                ),
                details: json!({
                    "window_duration_s": duration,
                    "maximum_allowed_s": self.max_window_duration_s,
                }),
            });
        }

        Ok(duration)
    }
}
