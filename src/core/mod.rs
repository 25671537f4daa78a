//! Core inference pipeline for the arrhythmia service.
//!
//! This module contains:
//! - Input validation of raw RR windows
//! - The three domain feature extractors (time, frequency, nonlinear)
//! - The aggregator that merges them into the ordered 15-value vector

pub mod extractor;
pub mod frequency_domain;
pub mod nonlinear;
pub mod time_domain;
pub mod validator;

// Re-export commonly used types
pub use extractor::{FeatureDomain, HrvFeatureExtractor, HrvFeatures, FEATURE_NAMES};
pub use frequency_domain::{FrequencyDomainExtractor, FrequencyDomainFeatures};
pub use nonlinear::{NonlinearExtractor, NonlinearFeatures};
pub use time_domain::{TimeDomainExtractor, TimeDomainFeatures};
pub use validator::{CleanedWindow, InputValidator, Rejection, RejectionCode};
