//! Arrhythmia risk prediction over extracted HRV features.
//!
//! The trained model is an opaque scoring function behind the [`RiskModel`]
//! trait; this module owns everything around it: shape validation against the
//! model's expected feature names, finiteness checks, and clamping of the
//! returned probability. A JSON-loadable logistic model ships as the default
//! implementation so the service runs end to end without the tree ensemble.

use crate::core::{FeatureDomain, HrvFeatures, FEATURE_NAMES};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An opaque scoring function over an ordered feature vector.
///
/// Implementations receive exactly the features named by the predictor's
/// expected list, in that order, all finite.
pub trait RiskModel: Send + Sync {
    /// Raw risk score for one feature vector. May overshoot [0, 1]; the
    /// predictor clamps.
    fn score(&self, features: &[f64]) -> f64;

    /// Model version string for audit responses.
    fn version(&self) -> &str;
}

/// Raised when inference cannot run on the supplied features.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    /// Overall feature validity is false; the invalid domains are attached.
    InvalidFeatures { invalid_domains: Vec<FeatureDomain> },
    /// The feature vector length differs from what the model expects.
    FeatureCountMismatch { expected: usize, received: usize },
    /// One or more feature values are NaN or infinite, listed by name.
    NonFiniteFeatures { names: Vec<String> },
}

impl std::fmt::Display for InferenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InferenceError::InvalidFeatures { invalid_domains } => {
                let names: Vec<&str> = invalid_domains.iter().map(|d| d.as_str()).collect();
                write!(f, "Invalid features. Invalid domains: {}", names.join(", "))
            }
            InferenceError::FeatureCountMismatch { expected, received } => {
                write!(
                    f,
                    "Feature count mismatch. Expected {expected}, got {received}"
                )
            }
            InferenceError::NonFiniteFeatures { names } => {
                write!(f, "Invalid values in features: {}", names.join(", "))
            }
        }
    }
}

impl std::error::Error for InferenceError {}

/// Raised when a model file cannot be loaded.
#[derive(Debug)]
pub enum ModelLoadError {
    Io(String),
    Parse(String),
    /// The file parsed but its shape is unusable (e.g. weight count does not
    /// match its own feature-name list).
    Malformed(String),
}

impl std::fmt::Display for ModelLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelLoadError::Io(e) => write!(f, "Failed to read model file: {e}"),
            ModelLoadError::Parse(e) => write!(f, "Invalid model JSON: {e}"),
            ModelLoadError::Malformed(e) => write!(f, "Malformed model: {e}"),
        }
    }
}

impl std::error::Error for ModelLoadError {}

/// Logistic regression scorer loadable from a JSON file.
///
/// Stands in for the exported tree ensemble in deployments where only the
/// calibrated linear head is available. The file carries its own feature-name
/// list so a stale model cannot silently consume a reordered vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub model_version: String,
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticModel {
    pub fn from_file(path: &Path) -> Result<Self, ModelLoadError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ModelLoadError::Io(e.to_string()))?;
        let model: LogisticModel =
            serde_json::from_str(&content).map_err(|e| ModelLoadError::Parse(e.to_string()))?;

        if model.feature_names.is_empty() {
            return Err(ModelLoadError::Malformed(
                "no feature names in model file".to_string(),
            ));
        }
        if model.weights.len() != model.feature_names.len() {
            return Err(ModelLoadError::Malformed(format!(
                "{} weights for {} feature names",
                model.weights.len(),
                model.feature_names.len()
            )));
        }

        Ok(model)
    }

    /// Neutral model scoring 0.5 everywhere, used when no model file is
    /// configured. Keeps the pipeline exercisable offline.
    pub fn neutral() -> Self {
        Self {
            model_version: "neutral-0".to_string(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            weights: vec![0.0; FEATURE_NAMES.len()],
            bias: 0.0,
        }
    }
}

impl RiskModel for LogisticModel {
    fn score(&self, features: &[f64]) -> f64 {
        let z: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(w, x)| w * x)
            .sum::<f64>()
            + self.bias;
        1.0 / (1.0 + (-z).exp())
    }

    fn version(&self) -> &str {
        &self.model_version
    }
}

/// Wraps a [`RiskModel`] with the shape and sanity checks the transport layer
/// relies on.
pub struct RiskPredictor {
    model: Box<dyn RiskModel>,
    feature_names: Vec<String>,
}

impl RiskPredictor {
    pub fn new(model: Box<dyn RiskModel>, feature_names: Vec<String>) -> Self {
        Self {
            model,
            feature_names,
        }
    }

    pub fn from_logistic(model: LogisticModel) -> Self {
        let feature_names = model.feature_names.clone();
        Self::new(Box::new(model), feature_names)
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    pub fn model_version(&self) -> &str {
        self.model.version()
    }

    /// Predict arrhythmia risk probability in [0, 1].
    ///
    /// Fails with a typed error rather than scoring when the features are
    /// flagged invalid, the count mismatches the model, or any value is
    /// non-finite.
    pub fn predict(&self, features: &HrvFeatures) -> Result<f64, InferenceError> {
        if !features.is_valid {
            return Err(InferenceError::InvalidFeatures {
                invalid_domains: features.invalid_domains.clone(),
            });
        }

        let vector = features.to_array();

        if vector.len() != self.feature_names.len() {
            return Err(InferenceError::FeatureCountMismatch {
                expected: self.feature_names.len(),
                received: vector.len(),
            });
        }

        let non_finite: Vec<String> = vector
            .iter()
            .zip(self.feature_names.iter())
            .filter(|(v, _)| !v.is_finite())
            .map(|(_, name)| name.clone())
            .collect();
        if !non_finite.is_empty() {
            return Err(InferenceError::NonFiniteFeatures { names: non_finite });
        }

        Ok(self.model.score(&vector).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::HrvFeatureExtractor;

    fn features(rr: &[f64]) -> HrvFeatures {
        HrvFeatureExtractor::new(&Config::default()).extract(rr)
    }

    fn modulated_window() -> Vec<f64> {
        (0..75)
            .map(|i| 800.0 + 40.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect()
    }

    #[test]
    fn test_neutral_model_scores_half() {
        let predictor = RiskPredictor::from_logistic(LogisticModel::neutral());
        let p = predictor.predict(&features(&modulated_window())).unwrap();
        assert!((p - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_invalid_features() {
        let predictor = RiskPredictor::from_logistic(LogisticModel::neutral());
        let err = predictor.predict(&features(&[800.0; 5])).unwrap_err();
        assert!(matches!(err, InferenceError::InvalidFeatures { .. }));
    }

    #[test]
    fn test_rejects_feature_count_mismatch() {
        let model = LogisticModel {
            model_version: "test".to_string(),
            feature_names: vec!["a".to_string(), "b".to_string()],
            weights: vec![0.0, 0.0],
            bias: 0.0,
        };
        let predictor = RiskPredictor::from_logistic(model);
        let err = predictor.predict(&features(&modulated_window())).unwrap_err();
        assert_eq!(
            err,
            InferenceError::FeatureCountMismatch {
                expected: 2,
                received: 15
            }
        );
    }

    #[test]
    fn test_rejects_non_finite_features_by_name() {
        // A constant window is overall-valid but carries a NaN lf_hf_ratio;
        // the predictor refuses it and names the offending features.
        let predictor = RiskPredictor::from_logistic(LogisticModel::neutral());
        let err = predictor.predict(&features(&[800.0; 75])).unwrap_err();
        match err {
            InferenceError::NonFiniteFeatures { names } => {
                assert!(names.contains(&"lf_hf_ratio".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_probability_is_clamped() {
        struct Overshoot;
        impl RiskModel for Overshoot {
            fn score(&self, _features: &[f64]) -> f64 {
                1.7
            }
            fn version(&self) -> &str {
                "overshoot"
            }
        }
        let names = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        let predictor = RiskPredictor::new(Box::new(Overshoot), names);
        let p = predictor.predict(&features(&modulated_window())).unwrap();
        assert_eq!(p, 1.0);
    }

    #[test]
    fn test_logistic_model_weight_mismatch_rejected() {
        let json = serde_json::json!({
            "model_version": "1.0.0",
            "feature_names": ["a", "b", "c"],
            "weights": [0.1],
            "bias": 0.0,
        });
        let dir = std::env::temp_dir().join("arrhythmia-model-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad_model.json");
        std::fs::write(&path, json.to_string()).unwrap();

        let err = LogisticModel::from_file(&path).unwrap_err();
        assert!(matches!(err, ModelLoadError::Malformed(_)));
    }
}
