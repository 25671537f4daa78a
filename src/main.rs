//! Arrhythmia Inference CLI
//!
//! HRV-based arrhythmia risk analysis from RR interval windows.

use arrhythmia_inference::{
    config::Config,
    core::{HrvFeatureExtractor, InputValidator},
    predictor::{LogisticModel, RiskPredictor},
    VERSION,
};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arrhythmia-inference")]
#[command(version = VERSION)]
#[command(about = "HRV-based arrhythmia risk analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a single RR interval window from a JSON file
    Analyze {
        /// Path to the window file ({"rr_intervals_ms": [...], "start_timestamp_iso": ..., "end_timestamp_iso": ...})
        input: PathBuf,

        /// Path to a logistic model file (neutral model if omitted)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Path to a config file (default location if omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the HTTP inference server
    Serve {
        /// Port to bind to
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Path to a logistic model file (serves degraded without one)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Path to a config file (default location if omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Path to a config file (default location if omitted)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Offline window file accepted by `analyze`.
#[derive(Debug, Deserialize)]
struct WindowFile {
    rr_intervals_ms: Vec<f64>,
    start_timestamp_iso: DateTime<Utc>,
    end_timestamp_iso: DateTime<Utc>,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            model,
            config,
        } => {
            cmd_analyze(&input, model.as_ref(), config.as_ref());
        }
        Commands::Serve {
            port,
            model,
            config,
        } => {
            cmd_serve(port, model.as_ref(), config.as_ref());
        }
        Commands::Config { config } => {
            cmd_config(config.as_ref());
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Config {
    match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    }
}

fn load_predictor(model: Option<&PathBuf>) -> Option<RiskPredictor> {
    match model {
        Some(path) => match LogisticModel::from_file(path) {
            Ok(model) => {
                println!("Loaded model {} from {:?}", model.model_version, path);
                Some(RiskPredictor::from_logistic(model))
            }
            Err(e) => {
                eprintln!("Error loading model: {e}");
                std::process::exit(1);
            }
        },
        None => None,
    }
}

fn cmd_analyze(input: &PathBuf, model: Option<&PathBuf>, config_path: Option<&PathBuf>) {
    let config = load_config(config_path);

    let content = match std::fs::read_to_string(input) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Error reading window file: {e}");
            std::process::exit(1);
        }
    };
    let window: WindowFile = match serde_json::from_str(&content) {
        Ok(window) => window,
        Err(e) => {
            eprintln!("Error parsing window file: {e}");
            std::process::exit(1);
        }
    };

    let analysis_id = uuid::Uuid::new_v4();
    println!("Arrhythmia Inference v{VERSION}");
    println!("Analysis ID: {analysis_id}");
    println!();

    // Validate
    let validator = InputValidator::new(&config);
    let cleaned = match validator.validate(
        &window.rr_intervals_ms,
        window.start_timestamp_iso,
        window.end_timestamp_iso,
    ) {
        Ok(cleaned) => cleaned,
        Err(rejection) => {
            eprintln!("Window rejected: {} ({})", rejection.message, rejection.code.as_str());
            eprintln!("Details: {}", rejection.details);
            std::process::exit(1);
        }
    };

    println!(
        "Window accepted: {} intervals over {:.1}s",
        cleaned.rr_ms.len(),
        cleaned.window_duration_s
    );

    // Extract features
    let extractor = HrvFeatureExtractor::new(&config);
    let features = extractor.extract(&cleaned.rr_ms);

    println!();
    println!("HRV Features:");
    for (name, value) in features.to_pairs() {
        if value.is_finite() {
            println!("  {name:<16} {value:>10.3}");
        } else {
            println!("  {name:<16} {value:>10}");
        }
    }
    println!();
    println!("Valid: {}", features.is_valid);
    if !features.invalid_domains.is_empty() {
        let names: Vec<&str> = features.invalid_domains.iter().map(|d| d.as_str()).collect();
        println!("Invalid domains: {}", names.join(", "));
    }

    // Score if a model was provided
    let predictor = load_predictor(model)
        .unwrap_or_else(|| RiskPredictor::from_logistic(LogisticModel::neutral()));
    match predictor.predict(&features) {
        Ok(probability) => {
            println!();
            println!(
                "Risk probability: {probability:.4} (model {})",
                predictor.model_version()
            );
        }
        Err(e) => {
            eprintln!();
            eprintln!("Inference skipped: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16, model: Option<&PathBuf>, config_path: Option<&PathBuf>) {
    use arrhythmia_inference::server::{run, ServerConfig};

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arrhythmia_inference=info,tower_http=warn".into()),
        )
        .init();

    let config = load_config(config_path);
    let predictor = load_predictor(model);
    if predictor.is_none() {
        eprintln!("Warning: no model file given, serving degraded (analysis returns 503)");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error creating runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(async move {
        let server_config = ServerConfig::new(port, config);
        match run(server_config, predictor).await {
            Ok((addr, shutdown_tx)) => {
                println!("Listening on http://{addr}");
                println!("Press Ctrl+C to stop");
                let _ = tokio::signal::ctrl_c().await;
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
    });
}

#[cfg(not(feature = "server"))]
fn cmd_serve(_port: u16, _model: Option<&PathBuf>, _config_path: Option<&PathBuf>) {
    eprintln!("Error: built without the 'server' feature");
    eprintln!("Rebuild with: cargo build --features server");
    std::process::exit(1);
}

fn cmd_config(config_path: Option<&PathBuf>) {
    let config = load_config(config_path);

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
