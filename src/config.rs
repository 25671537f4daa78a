//! Configuration for the arrhythmia inference service.
//!
//! Every threshold the pipeline uses is injectable here; the defaults are the
//! reference values the model was calibrated against. Inconsistent thresholds
//! are rejected at construction time, never per-request.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the inference pipeline and service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum number of RR intervals per window
    pub min_rr_count: usize,
    /// Maximum number of RR intervals per window
    pub max_rr_count: usize,
    /// Lowest physiologically plausible RR interval (ms)
    pub min_rr_value_ms: f64,
    /// Highest physiologically plausible RR interval (ms)
    pub max_rr_value_ms: f64,
    /// Minimum window duration (seconds)
    pub min_window_duration_s: f64,
    /// Maximum window duration (seconds)
    pub max_window_duration_s: f64,

    /// Minimum intervals for time-domain features
    pub td_min_intervals: usize,
    /// Uniform resampling rate for spectral analysis (Hz)
    pub fd_resample_rate: f64,
    /// Minimum intervals for frequency-domain features
    pub fd_min_intervals: usize,
    /// Low-frequency band (Hz)
    pub lf_band: (f64, f64),
    /// High-frequency band (Hz)
    pub hf_band: (f64, f64),
    /// Embedding dimension for sample entropy
    pub nl_m: usize,
    /// Tolerance factor for sample entropy (fraction of sample std)
    pub nl_r_factor: f64,
    /// Minimum intervals for nonlinear features
    pub nl_min_intervals: usize,

    /// Risk probability below this is "low"
    pub risk_threshold_low: f64,
    /// Risk probability below this is "moderate"
    pub risk_threshold_moderate: f64,
    /// Risk probability below this is "elevated", above is "high"
    pub risk_threshold_elevated: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_rr_count: 40,
            max_rr_count: 200,
            min_rr_value_ms: 200.0,
            max_rr_value_ms: 2000.0,
            min_window_duration_s: 30.0,
            max_window_duration_s: 120.0,

            td_min_intervals: 10,
            fd_resample_rate: 4.0,
            fd_min_intervals: 20,
            lf_band: (0.04, 0.15),
            hf_band: (0.15, 0.40),
            nl_m: 2,
            nl_r_factor: 0.2,
            nl_min_intervals: 30,

            risk_threshold_low: 0.30,
            risk_threshold_moderate: 0.50,
            risk_threshold_elevated: 0.70,
        }
    }
}

impl Config {
    /// Load configuration from the given path, or from the default location,
    /// falling back to defaults when no file exists.
    pub fn load(path: Option<&PathBuf>) -> Result<Self, ConfigError> {
        let config_path = path.cloned().unwrap_or_else(Self::config_path);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            serde_json::from_str::<Config>(&content)
                .map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("arrhythmia-inference")
            .join("config.json")
    }

    /// Check the thresholds for internal consistency.
    ///
    /// A misconfigured service must refuse to start rather than produce
    /// features the downstream model was never calibrated for.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn bad(msg: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.into()))
        }

        if self.min_rr_count == 0 || self.min_rr_count > self.max_rr_count {
            return bad(format!(
                "rr count bounds are inconsistent: [{}, {}]",
                self.min_rr_count, self.max_rr_count
            ));
        }
        if self.min_rr_value_ms <= 0.0 || self.min_rr_value_ms >= self.max_rr_value_ms {
            return bad(format!(
                "rr value bounds are inconsistent: [{}, {}] ms",
                self.min_rr_value_ms, self.max_rr_value_ms
            ));
        }
        if self.min_window_duration_s <= 0.0
            || self.min_window_duration_s >= self.max_window_duration_s
        {
            return bad(format!(
                "window duration bounds are inconsistent: [{}, {}] s",
                self.min_window_duration_s, self.max_window_duration_s
            ));
        }
        if self.fd_resample_rate <= 0.0 {
            return bad("fd_resample_rate must be positive");
        }
        for (name, band) in [("lf_band", self.lf_band), ("hf_band", self.hf_band)] {
            if band.0 < 0.0 || band.0 >= band.1 {
                return bad(format!("{name} is inconsistent: [{}, {}] Hz", band.0, band.1));
            }
        }
        if self.nl_m == 0 {
            return bad("nl_m must be at least 1");
        }
        if self.nl_r_factor <= 0.0 {
            return bad("nl_r_factor must be positive");
        }
        if self.td_min_intervals < 2 || self.fd_min_intervals < 4 || self.nl_min_intervals < 2 {
            return bad("per-domain minimum interval thresholds are too small");
        }
        if self.nl_min_intervals <= self.nl_m + 1 {
            return bad("nl_min_intervals must exceed nl_m + 1");
        }
        let t = (
            self.risk_threshold_low,
            self.risk_threshold_moderate,
            self.risk_threshold_elevated,
        );
        if !(0.0 < t.0 && t.0 < t.1 && t.1 < t.2 && t.2 < 1.0) {
            return bad(format!("risk thresholds are not ascending in (0, 1): {t:?}"));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Serialize(String),
    /// Thresholds that are internally inconsistent. Fails fast at startup.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "Parse error: {e}"),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_rr_count, 40);
        assert_eq!(config.max_rr_count, 200);
        assert_eq!(config.fd_resample_rate, 4.0);
        assert_eq!(config.nl_m, 2);
    }

    #[test]
    fn test_inverted_count_bounds_rejected() {
        let config = Config {
            min_rr_count: 300,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_inverted_band_rejected() {
        let config = Config {
            hf_band: (0.40, 0.15),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unordered_risk_thresholds_rejected() {
        let config = Config {
            risk_threshold_moderate: 0.2,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_rr_count, config.max_rr_count);
        assert_eq!(back.lf_band, config.lf_band);
    }
}
