pub mod behavioral;
pub mod forest;
pub mod manager;
pub mod pipeline;
pub mod rate;
pub mod statistical;
pub mod stats;
pub mod timeseries;

pub use behavioral::{BaselineUpdate, BehavioralDetector, PatternBaseline};
pub use forest::{IsolationForest, IsolationNode, SamplingStrategy, SplitPolicy};
pub use manager::PipelineManager;
pub use pipeline::{AnomalyDetectionPipeline, DetectionResults};
pub use rate::RateChangeDetector;
pub use statistical::StatisticalDetector;
pub use timeseries::{Decomposition, TimeSeriesDetector};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;
use traffic_core::DetectionMethod;

/// Fixed-capacity FIFO of metric values. Once full, every push evicts the
/// oldest value.
#[derive(Debug, Clone)]
pub struct BoundedWindow {
    data: VecDeque<f64>,
    capacity: usize,
}

impl BoundedWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `value`, evicting the oldest value when full. Non-finite
    /// values are dropped so they cannot poison later statistics.
    pub fn push(&mut self, value: f64) {
        if self.capacity == 0 {
            return;
        }
        if !value.is_finite() {
            warn!(value, "non-finite value dropped from window");
            return;
        }
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    pub fn extend<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        for value in values {
            self.push(value);
        }
    }

    pub fn mean(&self) -> f64 {
        stats::mean(self.data.iter())
    }

    /// Population standard deviation; 0 below two points.
    pub fn std_dev(&self) -> f64 {
        if self.data.len() < 2 {
            0.0
        } else {
            stats::population_std_dev(self.data.iter())
        }
    }

    pub fn sorted(&self) -> Vec<f64> {
        let mut sorted: Vec<f64> = self.data.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        sorted
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> + '_ {
        self.data.iter()
    }

    pub fn last(&self) -> Option<f64> {
        self.data.back().copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Stateful detector owned by a pipeline.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drop every observation and learned parameter.
    fn reset(&mut self);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticalConfig {
    pub window_size: usize,
}

impl Default for StatisticalConfig {
    fn default() -> Self {
        Self { window_size: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestConfig {
    pub n_trees: usize,
    pub sample_size: usize,
    pub sampling: SamplingStrategy,
    pub split: SplitPolicy,
    /// Only consulted by the random sampling and split variants.
    pub seed: u64,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            sample_size: 256,
            sampling: SamplingStrategy::Stride,
            split: SplitPolicy::Midpoint,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    pub seasonality: usize,
    /// History is capped at `seasonality * history_periods` values.
    pub history_periods: usize,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            seasonality: 24,
            history_periods: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralConfig {
    pub update: BaselineUpdate,
    /// Values retained per pattern key in `Recompute` mode.
    pub max_history: usize,
}

impl Default for BehavioralConfig {
    fn default() -> Self {
        Self {
            update: BaselineUpdate::Recompute,
            max_history: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateChangeConfig {
    pub window_size: usize,
}

impl Default for RateChangeConfig {
    fn default() -> Self {
        Self { window_size: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub zscore: f64,
    pub iqr_multiplier: f64,
    pub mad: f64,
    pub isolation_forest: f64,
    pub time_series: f64,
    pub behavioral: f64,
    pub rate_change: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            zscore: 3.0,
            iqr_multiplier: 1.5,
            mad: 3.5,
            isolation_forest: 0.6,
            time_series: 3.0,
            behavioral: 3.0,
            rate_change: 2.0,
        }
    }
}

impl ThresholdConfig {
    pub fn for_method(&self, method: DetectionMethod) -> f64 {
        match method {
            DetectionMethod::Zscore => self.zscore,
            DetectionMethod::Iqr => self.iqr_multiplier,
            DetectionMethod::Mad => self.mad,
            DetectionMethod::IsolationForest => self.isolation_forest,
            DetectionMethod::TimeSeries => self.time_series,
            DetectionMethod::Behavioral => self.behavioral,
            DetectionMethod::RateChange => self.rate_change,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub statistical: StatisticalConfig,
    pub isolation_forest: IsolationForestConfig,
    pub time_series: TimeSeriesConfig,
    pub behavioral: BehavioralConfig,
    pub rate_change: RateChangeConfig,
    pub thresholds: ThresholdConfig,
    pub default_methods: Vec<DetectionMethod>,
    /// Baseline consulted by the behavioural detector when a data point
    /// carries no pattern key.
    pub default_pattern: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            statistical: StatisticalConfig::default(),
            isolation_forest: IsolationForestConfig::default(),
            time_series: TimeSeriesConfig::default(),
            behavioral: BehavioralConfig::default(),
            rate_change: RateChangeConfig::default(),
            thresholds: ThresholdConfig::default(),
            default_methods: DetectionMethod::DEFAULT.to_vec(),
            default_pattern: "default".to_string(),
        }
    }
}
