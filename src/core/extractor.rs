//! Unified HRV feature extraction across all three domains.
//!
//! The aggregator runs the time-domain, frequency-domain, and nonlinear
//! extractors over the same cleaned RR sequence and merges their outputs into
//! a single ordered 15-value vector. The concatenation order is a binary
//! contract with the risk model: reordering it silently invalidates every
//! prediction the model makes.

use crate::config::Config;
use crate::core::frequency_domain::{FrequencyDomainExtractor, FrequencyDomainFeatures};
use crate::core::nonlinear::{NonlinearExtractor, NonlinearFeatures};
use crate::core::time_domain::{TimeDomainExtractor, TimeDomainFeatures};
use serde::{Deserialize, Serialize};

/// The three feature domains, named the way they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureDomain {
    TimeDomain,
    FrequencyDomain,
    Nonlinear,
}

impl FeatureDomain {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureDomain::TimeDomain => "time_domain",
            FeatureDomain::FrequencyDomain => "frequency_domain",
            FeatureDomain::Nonlinear => "nonlinear",
        }
    }
}

impl std::fmt::Display for FeatureDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined HRV features from all domains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrvFeatures {
    pub time_domain: TimeDomainFeatures,
    pub frequency_domain: FrequencyDomainFeatures,
    pub nonlinear: NonlinearFeatures,
    pub num_intervals: usize,
    /// Overall validity: true iff the time-domain features are valid. The
    /// time-domain block is load-bearing; spectral or entropy failure only
    /// degrades the window.
    pub is_valid: bool,
    pub invalid_domains: Vec<FeatureDomain>,
}

/// Feature order expected by the risk model: 8 time-domain, 6 frequency-
/// domain, 1 nonlinear.
pub const FEATURE_NAMES: [&str; 15] = [
    "mean_rr",
    "sdnn",
    "rmssd",
    "pnn50",
    "pnn20",
    "mean_hr",
    "std_hr",
    "cv_rr",
    "lf_power",
    "hf_power",
    "lf_hf_ratio",
    "total_power",
    "lf_nu",
    "hf_nu",
    "sample_entropy",
];

impl HrvFeatures {
    /// All 15 values in model order.
    pub fn to_array(&self) -> [f64; 15] {
        let td = self.time_domain.to_array();
        let fd = self.frequency_domain.to_array();
        let nl = self.nonlinear.to_array();

        let mut out = [0.0; 15];
        out[..8].copy_from_slice(&td);
        out[8..14].copy_from_slice(&fd);
        out[14..].copy_from_slice(&nl);
        out
    }

    /// Name/value pairs in the same order as [`to_array`](Self::to_array).
    pub fn to_pairs(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES
            .iter()
            .copied()
            .zip(self.to_array())
            .collect()
    }
}

/// Unified HRV feature extractor.
#[derive(Debug, Clone)]
pub struct HrvFeatureExtractor {
    time_domain: TimeDomainExtractor,
    frequency_domain: FrequencyDomainExtractor,
    nonlinear: NonlinearExtractor,
}

impl HrvFeatureExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            time_domain: TimeDomainExtractor::new(config),
            frequency_domain: FrequencyDomainExtractor::new(config),
            nonlinear: NonlinearExtractor::new(config),
        }
    }

    /// Extract all 15 features from a cleaned RR sequence.
    ///
    /// The three extractors only read the shared input and never each other's
    /// output, so their execution order is irrelevant.
    pub fn extract(&self, rr_ms: &[f64]) -> HrvFeatures {
        let td = self.time_domain.extract(rr_ms);
        let fd = self.frequency_domain.extract(rr_ms);
        let nl = self.nonlinear.extract(rr_ms);

        let mut invalid_domains = Vec::new();
        if !td.is_valid {
            invalid_domains.push(FeatureDomain::TimeDomain);
        }
        if !fd.is_valid {
            invalid_domains.push(FeatureDomain::FrequencyDomain);
        }
        if !nl.is_valid {
            invalid_domains.push(FeatureDomain::Nonlinear);
        }

        let is_valid = td.is_valid;

        HrvFeatures {
            time_domain: td,
            frequency_domain: fd,
            nonlinear: nl,
            num_intervals: rr_ms.len(),
            is_valid,
            invalid_domains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> HrvFeatureExtractor {
        HrvFeatureExtractor::new(&Config::default())
    }

    /// 75 BPM with enough sinusoidal modulation to light up every domain.
    fn modulated_window() -> Vec<f64> {
        (0..75)
            .map(|i| 800.0 + 40.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect()
    }

    #[test]
    fn test_feature_order_matches_names() {
        let features = extractor().extract(&modulated_window());
        let pairs = features.to_pairs();
        let array = features.to_array();

        assert_eq!(pairs.len(), 15);
        for (i, (name, value)) in pairs.iter().enumerate() {
            assert_eq!(*name, FEATURE_NAMES[i]);
            assert_eq!(*value, array[i], "value mismatch at {name}");
        }
    }

    #[test]
    fn test_domain_blocks_line_up_with_names() {
        assert_eq!(&FEATURE_NAMES[..8], &TimeDomainFeatures::NAMES);
        assert_eq!(&FEATURE_NAMES[8..14], &FrequencyDomainFeatures::NAMES);
        assert_eq!(&FEATURE_NAMES[14..], &NonlinearFeatures::NAMES);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let rr = modulated_window();
        let ext = extractor();
        let first = ext.extract(&rr).to_array();
        let second = ext.extract(&rr).to_array();
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
    }

    #[test]
    fn test_overall_validity_tracks_time_domain_only() {
        // 25 intervals: time-domain fine, frequency fine, nonlinear short.
        let rr: Vec<f64> = (0..25)
            .map(|i| 800.0 + 30.0 * (2.0 * std::f64::consts::PI * i as f64 / 8.0).sin())
            .collect();
        let features = extractor().extract(&rr);
        assert!(features.is_valid);
        assert!(features.time_domain.is_valid);
        assert!(!features.nonlinear.is_valid);
        assert_eq!(features.invalid_domains, vec![FeatureDomain::Nonlinear]);
    }

    #[test]
    fn test_all_domains_invalid_on_tiny_input() {
        let rr = vec![800.0; 5];
        let features = extractor().extract(&rr);
        assert!(!features.is_valid);
        assert_eq!(features.invalid_domains.len(), 3);
        assert!(features.to_array().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_domain_wire_names() {
        assert_eq!(
            serde_json::to_string(&FeatureDomain::TimeDomain).unwrap(),
            "\"time_domain\""
        );
        assert_eq!(FeatureDomain::FrequencyDomain.as_str(), "frequency_domain");
    }
}
