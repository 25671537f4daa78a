//! Nonlinear HRV features: sample entropy.
//!
//! SampEn(m, r, N) = -ln(A/B), where B counts template pairs of length m and
//! A counts pairs of length m+1 within Chebyshev distance r. The all-pairs
//! counting is quadratic in the sequence length; the window is bounded at a
//! few hundred intervals, and the downstream model was calibrated against
//! this exact estimator, so it must not be replaced with an approximation.

use crate::config::Config;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Nonlinear HRV features.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonlinearFeatures {
    pub sample_entropy: f64,
    pub num_intervals: usize,
    pub is_valid: bool,
}

impl NonlinearFeatures {
    pub const NAMES: [&'static str; 1] = ["sample_entropy"];

    pub fn to_array(&self) -> [f64; 1] {
        [self.sample_entropy]
    }

    fn invalid(num_intervals: usize) -> Self {
        Self {
            sample_entropy: f64::NAN,
            num_intervals,
            is_valid: false,
        }
    }

    fn passes_gate(&self) -> bool {
        self.sample_entropy.is_finite() && self.sample_entropy >= 0.0
    }
}

/// Extracts sample entropy.
#[derive(Debug, Clone)]
pub struct NonlinearExtractor {
    min_intervals: usize,
    m: usize,
    r_factor: f64,
}

impl NonlinearExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            min_intervals: config.nl_min_intervals,
            m: config.nl_m,
            r_factor: config.nl_r_factor,
        }
    }

    pub fn extract(&self, rr_ms: &[f64]) -> NonlinearFeatures {
        let n = rr_ms.len();

        if n < self.min_intervals {
            return NonlinearFeatures::invalid(n);
        }

        let sample_entropy = self.sample_entropy(rr_ms);

        let mut features = NonlinearFeatures {
            sample_entropy,
            num_intervals: n,
            is_valid: true,
        };

        if !features.passes_gate() {
            features.is_valid = false;
        }

        features
    }

    fn sample_entropy(&self, signal: &[f64]) -> f64 {
        let r = self.r_factor * signal.std_dev();

        // A perfectly regular signal has zero complexity by construction;
        // with r == 0 every pair would otherwise fail the tolerance test.
        if r == 0.0 {
            return 0.0;
        }

        let b = count_template_matches(signal, self.m, r);
        let a = count_template_matches(signal, self.m + 1, r);

        // A/B is undefined when either count is zero. Known limitation of the
        // estimator on short or highly regular series; returned as NaN, never
        // approximated by ln(0).
        if a == 0 || b == 0 {
            return f64::NAN;
        }

        -((a as f64 / b as f64).ln())
    }
}

/// Count ordered pairs of distinct length-`m` templates whose Chebyshev
/// distance is within `r`. Templates start at offsets `0..n-m`, matching the
/// counts the downstream model was trained on.
fn count_template_matches(signal: &[f64], m: usize, r: f64) -> u64 {
    let n = signal.len();
    if n <= m {
        return 0;
    }
    let n_templates = n - m;

    let mut count = 0u64;
    for i in 0..n_templates {
        for j in (i + 1)..n_templates {
            let within = signal[i..i + m]
                .iter()
                .zip(&signal[j..j + m])
                .all(|(a, b)| (a - b).abs() <= r);
            if within {
                count += 1;
            }
        }
    }
    count
}
