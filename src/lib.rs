//! Arrhythmia Inference - HRV-based arrhythmia risk analysis.
//!
//! This library turns a window of RR intervals (beat-to-beat timing from a
//! wearable or Holter stream) into a 15-value HRV feature vector and an
//! arrhythmia risk probability.
//!
//! # Pipeline
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Arrhythmia Inference                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌─────────────┐   ┌────────────┐            │
//! │  │ Validator │──▶│  Extractor  │──▶│ Predictor  │            │
//! │  │ (clean RR)│   │ (15 values) │   │ (risk 0-1) │            │
//! │  └───────────┘   └─────────────┘   └────────────┘            │
//! │        │                │                 │                  │
//! │        ▼                ▼                 ▼                  │
//! │   Rejection        HrvFeatures      risk shaping             │
//! │   (typed code)     (3 domains)      (HTTP layer)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The feature vector order is fixed: 8 time-domain, 6 frequency-domain,
//! 1 nonlinear. The downstream model was trained against this exact order
//! and against the exact estimators in [`core`], including their quirks.
//!
//! # Example
//!
//! ```no_run
//! use arrhythmia_inference::config::Config;
//! use arrhythmia_inference::core::{HrvFeatureExtractor, InputValidator};
//! use chrono::Utc;
//!
//! let config = Config::default();
//! let validator = InputValidator::new(&config);
//! let extractor = HrvFeatureExtractor::new(&config);
//!
//! let rr_ms: Vec<f64> = vec![800.0; 75];
//! let start = Utc::now();
//! let end = start + chrono::Duration::seconds(60);
//!
//! let cleaned = validator.validate(&rr_ms, start, end).expect("window rejected");
//! let features = extractor.extract(&cleaned.rr_ms);
//! println!("{:?}", features.to_pairs());
//! ```

pub mod config;
pub mod core;
pub mod predictor;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use core::{
    CleanedWindow, FeatureDomain, HrvFeatureExtractor, HrvFeatures, InputValidator, Rejection,
    RejectionCode, FEATURE_NAMES,
};
pub use predictor::{InferenceError, LogisticModel, ModelLoadError, RiskModel, RiskPredictor};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
