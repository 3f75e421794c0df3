use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traffic_anomaly::AnomalyDetectionPipeline;
use traffic_config::{ConfigManager, LoggingConfig};
use traffic_core::DetectionMethod;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file; environment variables only when omitted
    #[arg(short, long, env = "TRAFFIC_ANOMALY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Detection methods to run, comma separated
    #[arg(short, long, value_delimiter = ',')]
    methods: Vec<String>,

    /// Number of synthetic training points
    #[arg(long, default_value_t = 200)]
    points: usize,

    /// Replay this many trailing points through detection
    #[arg(long, default_value_t = 20)]
    tail: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let manager = match &args.config {
        Some(path) => ConfigManager::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigManager::from_env()?,
    };
    let config = manager.get_config().clone();

    init_logging(args.debug, &config.logging);
    manager.validate()?;

    let methods = args
        .methods
        .iter()
        .map(|name| name.parse::<DetectionMethod>())
        .collect::<traffic_core::Result<Vec<_>>>()?;
    let methods = (!methods.is_empty()).then_some(methods);

    info!("Starting traffic anomaly detection demo");

    let normal = synthetic_traffic(args.points);
    let mut observed = normal.clone();
    inject_anomalies(&mut observed);

    let mut pipeline = AnomalyDetectionPipeline::from_config(config.pipeline);
    pipeline.train(&normal);

    let start = observed.len().saturating_sub(args.tail);
    let mut flagged = 0;
    for (index, &value) in observed.iter().enumerate().skip(start) {
        let results = pipeline.detect(value, methods.as_deref());
        let ensemble = pipeline.aggregate_results(&results);
        debug!(index, value, score = ensemble.score, "point evaluated");

        if ensemble.is_anomaly {
            flagged += 1;
            info!(
                index,
                value,
                score = %format_args!("{:.2}", ensemble.score),
                details = %serde_json::Value::Object(ensemble.details),
                "ANOMALY"
            );
        }
    }

    info!(
        evaluated = observed.len() - start,
        flagged, "Detection run complete"
    );
    Ok(())
}

fn init_logging(debug: bool, logging: &LoggingConfig) {
    let env_filter = if debug { "debug" } else { logging.level.as_str() };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(logging.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!logging.json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Upward trend with a ten-step sawtooth on top.
fn synthetic_traffic(points: usize) -> Vec<f64> {
    (0..points)
        .map(|i| 100.0 + i as f64 * 0.5 + (i % 10) as f64 * 2.0)
        .collect()
}

fn inject_anomalies(series: &mut [f64]) {
    if let Some(value) = series.get_mut(50) {
        *value = 200.0;
    }
    if let Some(value) = series.get_mut(100) {
        *value = 10.0;
    }
}
