use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use traffic_anomaly::{BaselineUpdate, PipelineConfig};
use traffic_core::{AnomalyError, DetectionMethod, Result};

/// Environment variables override file values, e.g.
/// `TRAFFIC_ANOMALY__PIPELINE__STATISTICAL__WINDOW_SIZE=50`.
pub const ENV_PREFIX: &str = "TRAFFIC_ANOMALY";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

pub struct ConfigManager {
    config: Config,
    traffic_config: TrafficConfig,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::from_file("traffic-anomaly.yaml")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(environment())
            .build()
            .map_err(|e| AnomalyError::Configuration(e.to_string()))?;

        let traffic_config = deserialize(&config)?;
        info!(path = %path.as_ref().display(), "configuration loaded");

        Ok(Self {
            config,
            traffic_config,
        })
    }

    pub fn from_env() -> Result<Self> {
        let config = Config::builder()
            .add_source(environment())
            .build()
            .map_err(|e| AnomalyError::Configuration(e.to_string()))?;

        let traffic_config = deserialize(&config)?;
        info!("configuration loaded from environment");

        Ok(Self {
            config,
            traffic_config,
        })
    }

    pub fn get_config(&self) -> &TrafficConfig {
        &self.traffic_config
    }

    pub fn get_config_mut(&mut self) -> &mut TrafficConfig {
        &mut self.traffic_config
    }

    /// Discard in-memory edits and re-read the loaded sources.
    pub fn reload(&mut self) -> Result<()> {
        self.traffic_config = deserialize(&self.config)?;
        info!("configuration reloaded");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_pipeline(&self.traffic_config.pipeline)?;
        info!("configuration validation passed");
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.traffic_config)
            .map_err(|e| AnomalyError::Configuration(e.to_string()))?;

        std::fs::write(path.as_ref(), yaml)
            .map_err(|e| AnomalyError::Configuration(e.to_string()))?;

        info!(path = %path.as_ref().display(), "configuration saved");
        Ok(())
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("pipeline.default_methods")
}

fn deserialize(config: &Config) -> Result<TrafficConfig> {
    config
        .clone()
        .try_deserialize()
        .map_err(|e| AnomalyError::Configuration(e.to_string()))
}

fn invalid(name: &str, reason: &str) -> AnomalyError {
    AnomalyError::InvalidParameter {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

/// Reject settings under which a detector could never produce a verdict.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    if config.statistical.window_size == 0 {
        return Err(invalid("statistical.window_size", "must be at least 1"));
    }
    if config.isolation_forest.n_trees == 0 {
        return Err(invalid("isolation_forest.n_trees", "must be at least 1"));
    }
    if config.isolation_forest.sample_size == 0 {
        return Err(invalid("isolation_forest.sample_size", "must be at least 1"));
    }
    if config.time_series.seasonality == 0 {
        return Err(invalid("time_series.seasonality", "must be at least 1"));
    }
    if config.behavioral.update == BaselineUpdate::Recompute && config.behavioral.max_history == 0
    {
        return Err(invalid(
            "behavioral.max_history",
            "must be at least 1 when recomputing baselines",
        ));
    }
    if config.rate_change.window_size < 3 {
        return Err(invalid("rate_change.window_size", "must be at least 3"));
    }

    for method in DetectionMethod::ALL {
        let threshold = config.thresholds.for_method(method);
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(invalid(
                &format!("thresholds.{method}"),
                "must be a positive number",
            ));
        }
    }
    if config.thresholds.isolation_forest > 1.0 {
        return Err(invalid(
            "thresholds.isolation_forest",
            "anomaly scores never exceed 1.0",
        ));
    }

    if config.default_methods.is_empty() {
        return Err(AnomalyError::Configuration(
            "No default detection methods configured".to_string(),
        ));
    }
    if config.default_pattern.is_empty() {
        return Err(invalid("default_pattern", "must not be empty"));
    }

    Ok(())
}
