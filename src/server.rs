//! HTTP server exposing the arrhythmia analysis pipeline.
//!
//! This module provides an HTTP server that:
//! - Accepts RR interval windows via POST /v1/arrhythmia/analyze
//! - Runs validation, feature extraction, and risk inference
//! - Reports service and model status via GET /health
//!
//! # Architecture
//!
//! ```text
//! Wearable bridge ──→ POST /v1/arrhythmia/analyze ──→ validator ──→ extractor ──→ predictor
//!                                                                                     ↓
//!                                                                           risk assessment
//! ```

use crate::config::Config;
use crate::core::{HrvFeatureExtractor, HrvFeatures, InputValidator};
use crate::predictor::RiskPredictor;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Pipeline thresholds and bands
    pub config: Config,
}

impl ServerConfig {
    pub fn new(port: u16, config: Config) -> Self {
        Self { port, config }
    }
}

/// Shared server state
pub struct ServerState {
    validator: InputValidator,
    extractor: HrvFeatureExtractor,
    predictor: Option<RiskPredictor>,
    config: Config,
    started_at: Instant,
    last_inference_at: RwLock<Option<DateTime<Utc>>>,
}

impl ServerState {
    pub fn new(config: &ServerConfig, predictor: Option<RiskPredictor>) -> Self {
        Self {
            validator: InputValidator::new(&config.config),
            extractor: HrvFeatureExtractor::new(&config.config),
            predictor,
            config: config.config.clone(),
            started_at: Instant::now(),
            last_inference_at: RwLock::new(None),
        }
    }
}

/// Arrhythmia risk classification levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    High,
}

/// Analysis confidence levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Clinical recommendations based on risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "normal_rhythm")]
    Normal,
    #[serde(rename = "continue_monitoring")]
    Monitor,
    #[serde(rename = "consult_physician")]
    Consult,
    #[serde(rename = "seek_immediate_care")]
    Urgent,
}

/// Metadata about the analysis window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowMetadata {
    pub start_timestamp_iso: DateTime<Utc>,
    pub end_timestamp_iso: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_uid: Option<String>,
}

/// Request body for the analysis endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub request_id: String,
    pub rr_intervals_ms: Vec<f64>,
    pub window_metadata: WindowMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArrhythmiaAnalysis {
    pub risk_probability: f64,
    pub risk_level: RiskLevel,
    pub confidence: Confidence,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimeDomainSummary {
    pub mean_rr_ms: f64,
    pub sdnn_ms: f64,
    pub rmssd_ms: f64,
    pub pnn50_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrequencyDomainSummary {
    pub lf_hf_ratio: f64,
    pub total_power_ms2: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureInterpretation {
    pub hrv_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_concern: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureSummary {
    pub time_domain: TimeDomainSummary,
    pub frequency_domain: FrequencyDomainSummary,
    pub interpretation: FeatureInterpretation,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub model_version: String,
    pub feature_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    pub feature_extraction_ms: u64,
    pub inference_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Audit {
    pub analyzed_at_iso: DateTime<Utc>,
    pub rr_count_received: usize,
    pub window_duration_s: f64,
}

/// Successful analysis response
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub request_id: String,
    pub status: String,
    pub analysis: ArrhythmiaAnalysis,
    pub feature_summary: FeatureSummary,
    pub model_info: ModelInfo,
    pub timing: Timing,
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Error response for failed analysis
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub request_id: String,
    pub status: String,
    pub error: ErrorDetails,
    pub timestamp_iso: DateTime<Utc>,
}

impl ErrorResponse {
    fn new(request_id: &str, code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        Self {
            request_id: request_id.to_string(),
            status: "error".to_string(),
            error: ErrorDetails {
                code: code.to_string(),
                message,
                details,
            },
            timestamp_iso: Utc::now(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub uptime_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_inference_at: Option<DateTime<Utc>>,
    pub version: String,
}

fn classify_risk(probability: f64, config: &Config) -> RiskLevel {
    if probability < config.risk_threshold_low {
        RiskLevel::Low
    } else if probability < config.risk_threshold_moderate {
        RiskLevel::Moderate
    } else if probability < config.risk_threshold_elevated {
        RiskLevel::Elevated
    } else {
        RiskLevel::High
    }
}

fn get_confidence(features_valid: bool, rr_count: usize) -> Confidence {
    if !features_valid {
        return Confidence::Low;
    }
    if rr_count >= 60 {
        Confidence::High
    } else if rr_count >= 40 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn get_recommendation(risk_level: RiskLevel) -> Recommendation {
    match risk_level {
        RiskLevel::Low => Recommendation::Normal,
        RiskLevel::Moderate => Recommendation::Monitor,
        RiskLevel::Elevated => Recommendation::Consult,
        RiskLevel::High => Recommendation::Urgent,
    }
}

fn interpret_hrv(features: &HrvFeatures) -> FeatureInterpretation {
    let sdnn = features.time_domain.sdnn;
    let rmssd = features.time_domain.rmssd;
    let lf_hf_ratio = features.frequency_domain.lf_hf_ratio;

    let hrv_status = if sdnn < 20.0 {
        "severely_reduced"
    } else if sdnn < 50.0 {
        "reduced"
    } else if sdnn < 100.0 {
        "normal"
    } else {
        "elevated"
    };

    let dominant_concern = if rmssd > 100.0 {
        Some("possible_atrial_fibrillation".to_string())
    } else if lf_hf_ratio.is_finite() && lf_hf_ratio > 4.0 {
        Some("elevated_sympathetic_tone".to_string())
    } else if sdnn < 20.0 {
        Some("severely_reduced_autonomic_function".to_string())
    } else {
        None
    };

    FeatureInterpretation {
        hrv_status: hrv_status.to_string(),
        dominant_concern,
    }
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let model_loaded = state.predictor.is_some();
    let model_version = state
        .predictor
        .as_ref()
        .map(|p| p.model_version().to_string());
    let last_inference_at = *state.last_inference_at.read().await;

    Json(HealthResponse {
        status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
        model_loaded,
        model_version,
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        last_inference_at,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /v1/arrhythmia/analyze
///
/// Validates the RR window, extracts the 15 HRV features, runs risk
/// inference, and shapes the clinical response.
async fn analyze(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<AnalysisRequest>,
) -> Result<Json<AnalysisResponse>, (StatusCode, Json<ErrorResponse>)> {
    let request_id = request.request_id.clone();
    let start = Instant::now();

    tracing::info!(
        request_id = %request_id,
        rr_count = request.rr_intervals_ms.len(),
        "Received analysis request"
    );

    // Step 1: Validate input
    let cleaned = state
        .validator
        .validate(
            &request.rr_intervals_ms,
            request.window_metadata.start_timestamp_iso,
            request.window_metadata.end_timestamp_iso,
        )
        .map_err(|rejection| {
            tracing::warn!(request_id = %request_id, code = %rejection.code.as_str(), "Validation failed");
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse::new(
                    &request_id,
                    rejection.code.as_str(),
                    rejection.message.clone(),
                    Some(rejection.details.clone()),
                )),
            )
        })?;

    // Step 2: Extract features
    let feature_start = Instant::now();
    let features = state.extractor.extract(&cleaned.rr_ms);
    let feature_time_ms = feature_start.elapsed().as_millis() as u64;

    if !features.is_valid {
        tracing::warn!(request_id = %request_id, ?features.invalid_domains, "Feature extraction failed");
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new(
                &request_id,
                "FEATURE_EXTRACTION_FAILED",
                "Could not extract features from RR intervals".to_string(),
                serde_json::to_value(&features.invalid_domains)
                    .ok()
                    .map(|v| serde_json::json!({ "invalid_domains": v })),
            )),
        ));
    }

    // Step 3: Run inference
    let inference_start = Instant::now();

    let predictor = state.predictor.as_ref().ok_or_else(|| {
        tracing::error!(request_id = %request_id, "Model not loaded");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new(
                &request_id,
                "MODEL_UNAVAILABLE",
                "Arrhythmia detection model is not loaded".to_string(),
                None,
            )),
        )
    })?;

    let risk_probability = predictor.predict(&features).map_err(|e| {
        tracing::error!(request_id = %request_id, error = %e, "Inference error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(
                &request_id,
                "INFERENCE_ERROR",
                e.to_string(),
                None,
            )),
        )
    })?;

    let inference_time_ms = inference_start.elapsed().as_millis() as u64;
    let total_time_ms = start.elapsed().as_millis() as u64;

    // Step 4: Build response
    let risk_level = classify_risk(risk_probability, &state.config);
    let confidence = get_confidence(features.is_valid, cleaned.rr_ms.len());
    let recommendation = get_recommendation(risk_level);

    let fd = &features.frequency_domain;
    let response = AnalysisResponse {
        request_id: request_id.clone(),
        status: "success".to_string(),
        analysis: ArrhythmiaAnalysis {
            risk_probability: (risk_probability * 10_000.0).round() / 10_000.0,
            risk_level,
            confidence,
            recommendation,
        },
        feature_summary: FeatureSummary {
            time_domain: TimeDomainSummary {
                mean_rr_ms: round1(features.time_domain.mean_rr),
                sdnn_ms: round1(features.time_domain.sdnn),
                rmssd_ms: round1(features.time_domain.rmssd),
                pnn50_percent: round1(features.time_domain.pnn50),
            },
            frequency_domain: FrequencyDomainSummary {
                lf_hf_ratio: if fd.lf_hf_ratio.is_finite() {
                    (fd.lf_hf_ratio * 100.0).round() / 100.0
                } else {
                    0.0
                },
                total_power_ms2: if fd.total_power.is_finite() {
                    round1(fd.total_power)
                } else {
                    0.0
                },
            },
            interpretation: interpret_hrv(&features),
        },
        model_info: ModelInfo {
            model_version: predictor.model_version().to_string(),
            feature_count: predictor.feature_count(),
        },
        timing: Timing {
            feature_extraction_ms: feature_time_ms,
            inference_ms: inference_time_ms,
            total_ms: total_time_ms,
        },
        audit: Audit {
            analyzed_at_iso: Utc::now(),
            rr_count_received: request.rr_intervals_ms.len(),
            window_duration_s: cleaned.window_duration_s,
        },
    };

    *state.last_inference_at.write().await = Some(Utc::now());

    tracing::info!(
        request_id = %request_id,
        risk = risk_probability,
        level = ?risk_level,
        total_ms = total_time_ms,
        "Analysis complete"
    );

    Ok(Json(response))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    predictor: Option<RiskPredictor>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(&config, predictor));

    let app = Router::new()
        .route("/health", get(health))
        .route("/v1/arrhythmia/analyze", post(analyze))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Arrhythmia inference server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_risk_level_thresholds() {
        let config = Config::default();
        assert_eq!(classify_risk(0.0, &config), RiskLevel::Low);
        assert_eq!(classify_risk(0.29, &config), RiskLevel::Low);
        assert_eq!(classify_risk(0.30, &config), RiskLevel::Moderate);
        assert_eq!(classify_risk(0.49, &config), RiskLevel::Moderate);
        assert_eq!(classify_risk(0.50, &config), RiskLevel::Elevated);
        assert_eq!(classify_risk(0.70, &config), RiskLevel::High);
        assert_eq!(classify_risk(1.0, &config), RiskLevel::High);
    }

    #[test]
    fn test_confidence_by_interval_count() {
        assert_eq!(get_confidence(false, 100), Confidence::Low);
        assert_eq!(get_confidence(true, 60), Confidence::High);
        assert_eq!(get_confidence(true, 59), Confidence::Medium);
        assert_eq!(get_confidence(true, 40), Confidence::Medium);
        assert_eq!(get_confidence(true, 39), Confidence::Low);
    }

    #[test]
    fn test_recommendation_tracks_risk_level() {
        assert_eq!(get_recommendation(RiskLevel::Low), Recommendation::Normal);
        assert_eq!(get_recommendation(RiskLevel::High), Recommendation::Urgent);
    }

    #[test]
    fn test_recommendation_wire_names() {
        assert_eq!(
            serde_json::to_string(&Recommendation::Urgent).unwrap(),
            "\"seek_immediate_care\""
        );
        assert_eq!(
            serde_json::to_string(&RiskLevel::Moderate).unwrap(),
            "\"moderate\""
        );
    }

    #[test]
    fn test_interpretation_concern_precedence() {
        let extractor = HrvFeatureExtractor::new(&Config::default());
        // Large alternating swings push rmssd far past 100 ms.
        let rr: Vec<f64> = (0..60)
            .map(|i| if i % 2 == 0 { 600.0 } else { 1000.0 })
            .collect();
        let features = extractor.extract(&rr);
        let interp = interpret_hrv(&features);
        assert_eq!(
            interp.dominant_concern.as_deref(),
            Some("possible_atrial_fibrillation")
        );
    }

    #[test]
    fn test_interpretation_normal_window() {
        let extractor = HrvFeatureExtractor::new(&Config::default());
        let rr: Vec<f64> = (0..75)
            .map(|i| 800.0 + 40.0 * (2.0 * std::f64::consts::PI * i as f64 / 12.0).sin())
            .collect();
        let features = extractor.extract(&rr);
        let interp = interpret_hrv(&features);
        assert!(interp.hrv_status == "normal" || interp.hrv_status == "reduced");
    }
}
