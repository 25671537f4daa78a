//! Time-domain HRV features.
//!
//! Eight statistical descriptors of a cleaned RR sequence. These are the
//! load-bearing features: overall window validity follows this domain alone.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Time-domain HRV features.
///
/// When `is_valid` is false after the minimum-data check, all numeric fields
/// are NaN rather than zero so an invalid window can never masquerade as a
/// flat-line healthy one downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeDomainFeatures {
    /// Mean RR interval (ms)
    pub mean_rr: f64,
    /// Standard deviation of NN intervals (ms), sample std (n-1)
    pub sdnn: f64,
    /// Root mean square of successive differences (ms)
    pub rmssd: f64,
    /// Percentage of successive differences > 50 ms (0-100)
    pub pnn50: f64,
    /// Percentage of successive differences > 20 ms (0-100)
    pub pnn20: f64,
    /// Mean heart rate (BPM)
    pub mean_hr: f64,
    /// Standard deviation of heart rate (BPM)
    pub std_hr: f64,
    /// Coefficient of variation (sdnn / mean_rr * 100)
    pub cv_rr: f64,
    pub num_intervals: usize,
    pub is_valid: bool,
}

impl TimeDomainFeatures {
    pub const NAMES: [&'static str; 8] = [
        "mean_rr", "sdnn", "rmssd", "pnn50", "pnn20", "mean_hr", "std_hr", "cv_rr",
    ];

    pub fn to_array(&self) -> [f64; 8] {
        [
            self.mean_rr,
            self.sdnn,
            self.rmssd,
            self.pnn50,
            self.pnn20,
            self.mean_hr,
            self.std_hr,
            self.cv_rr,
        ]
    }

    fn invalid(num_intervals: usize) -> Self {
        Self {
            mean_rr: f64::NAN,
            sdnn: f64::NAN,
            rmssd: f64::NAN,
            pnn50: f64::NAN,
            pnn20: f64::NAN,
            mean_hr: f64::NAN,
            std_hr: f64::NAN,
            cv_rr: f64::NAN,
            num_intervals,
            is_valid: false,
        }
    }

    /// Plausibility gate applied after computation. Arithmetic on adversarial
    /// input can succeed numerically yet be clinically nonsensical; values are
    /// kept for diagnostics but the validity flag is dropped.
    fn passes_gate(&self) -> bool {
        if self.to_array().iter().any(|v| !v.is_finite()) {
            return false;
        }
        if self.mean_rr <= 0.0 || self.mean_rr > 3000.0 {
            return false;
        }
        if self.mean_hr <= 0.0 || self.mean_hr > 300.0 {
            return false;
        }
        if self.sdnn < 0.0 || self.rmssd < 0.0 {
            return false;
        }
        if self.pnn50 < 0.0 || self.pnn50 > 100.0 {
            return false;
        }
        true
    }
}

/// Extracts the eight time-domain descriptors.
#[derive(Debug, Clone)]
pub struct TimeDomainExtractor {
    min_intervals: usize,
}

impl TimeDomainExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            min_intervals: config.td_min_intervals,
        }
    }

    pub fn extract(&self, rr_ms: &[f64]) -> TimeDomainFeatures {
        let n = rr_ms.len();

        if n < self.min_intervals {
            return TimeDomainFeatures::invalid(n);
        }

        let mean_rr = rr_ms.mean();
        let sdnn = rr_ms.std_dev();

        let diffs: Vec<f64> = rr_ms.windows(2).map(|w| w[1] - w[0]).collect();
        let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();

        let pnn50 = percent_exceeding(&diffs, 50.0);
        let pnn20 = percent_exceeding(&diffs, 20.0);

        let hr_bpm: Vec<f64> = rr_ms.iter().map(|&rr| 60_000.0 / rr).collect();
        let mean_hr = (&hr_bpm[..]).mean();
        let std_hr = (&hr_bpm[..]).std_dev();

        let cv_rr = if mean_rr > 0.0 {
            sdnn / mean_rr * 100.0
        } else {
            0.0
        };

        let mut features = TimeDomainFeatures {
            mean_rr,
            sdnn,
            rmssd,
            pnn50,
            pnn20,
            mean_hr,
            std_hr,
            cv_rr,
            num_intervals: n,
            is_valid: true,
        };

        if !features.passes_gate() {
            features.is_valid = false;
        }

        features
    }
}

/// Percentage of successive differences whose magnitude exceeds `threshold_ms`.
fn percent_exceeding(diffs: &[f64], threshold_ms: f64) -> f64 {
    if diffs.is_empty() {
        return 0.0;
    }
    let count = diffs.iter().filter(|d| d.abs() > threshold_ms).count();
    count as f64 / diffs.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> TimeDomainExtractor {
        TimeDomainExtractor::new(&Config::default())
    }

    #[test]
    fn test_constant_sequence_has_zero_variability() {
        let rr = vec![800.0; 20];
        let f = extractor().extract(&rr);
        assert!(f.is_valid);
        assert_eq!(f.mean_rr, 800.0);
        assert_eq!(f.sdnn, 0.0);
        assert_eq!(f.rmssd, 0.0);
        assert_eq!(f.pnn50, 0.0);
        assert_eq!(f.pnn20, 0.0);
        assert_eq!(f.cv_rr, 0.0);
        assert!((f.mean_hr - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_alternating_sequence() {
        // 600/1000 alternating: every successive difference is 400 ms.
        let rr: Vec<f64> = (0..50)
            .map(|i| if i % 2 == 0 { 600.0 } else { 1000.0 })
            .collect();
        let f = extractor().extract(&rr);
        assert!(f.is_valid);
        assert!((f.rmssd - 400.0).abs() < 1e-9);
        assert!(f.pnn50 > 95.0);
        assert!(f.pnn20 > 95.0);
    }

    #[test]
    fn test_short_sequence_is_invalid_with_nan_fields() {
        let rr = vec![800.0; 9];
        let f = extractor().extract(&rr);
        assert!(!f.is_valid);
        assert_eq!(f.num_intervals, 9);
        assert!(f.to_array().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_gate_flips_flag_but_keeps_values() {
        // Mean RR above 3000 ms is outside the plausible range the gate
        // accepts, even though the arithmetic is fine.
        let rr = vec![3500.0; 15];
        let f = extractor().extract(&rr);
        assert!(!f.is_valid);
        assert_eq!(f.mean_rr, 3500.0);
    }

    #[test]
    fn test_known_statistics() {
        let rr = vec![
            780.0, 820.0, 810.0, 790.0, 830.0, 800.0, 815.0, 785.0, 805.0, 795.0,
        ];
        let f = extractor().extract(&rr);
        assert!(f.is_valid);
        assert!((f.mean_rr - 803.0).abs() < 1e-9);
        // Sample std with n-1 divisor.
        let mean = 803.0;
        let var: f64 =
            rr.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (rr.len() as f64 - 1.0);
        assert!((f.sdnn - var.sqrt()).abs() < 1e-9);
        assert!(f.std_hr > 0.0);
    }

    #[test]
    fn test_percent_exceeding_is_strict() {
        // Differences of exactly 50 ms do not count toward pNN50.
        let diffs = [50.0, -50.0, 51.0, -49.0];
        assert_eq!(percent_exceeding(&diffs, 50.0), 25.0);
    }
}
