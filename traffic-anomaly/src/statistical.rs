//! Window-based outlier tests: Z-score, interquartile range and median
//! absolute deviation.
//!
//! Every test pushes the value under evaluation into the window before
//! computing its statistics, so the value is part of its own reference set.

use crate::{stats, BoundedWindow, Detector, StatisticalConfig};
use tracing::debug;
use traffic_core::{reason, AnomalyResult, DetectionMethod, ResultBuilder};

/// Consistency constant relating MAD to the standard deviation of a normal
/// distribution.
const MAD_SCALE: f64 = 0.6745;

#[derive(Debug, Clone)]
pub struct StatisticalDetector {
    window: BoundedWindow,
}

impl StatisticalDetector {
    pub fn new(window_size: usize) -> Self {
        Self {
            window: BoundedWindow::new(window_size),
        }
    }

    pub fn from_config(config: &StatisticalConfig) -> Self {
        Self::new(config.window_size)
    }

    pub fn add_point(&mut self, value: f64) {
        self.window.push(value);
    }

    pub fn calculate_mean(&self) -> f64 {
        self.window.mean()
    }

    pub fn calculate_std(&self) -> f64 {
        self.window.std_dev()
    }

    pub fn window(&self) -> &BoundedWindow {
        &self.window
    }

    pub fn zscore_detection(&mut self, value: f64, threshold: f64) -> AnomalyResult {
        let method = DetectionMethod::Zscore.as_str();
        self.add_point(value);

        if self.window.len() < 2 {
            return AnomalyResult::unavailable(method, threshold, reason::INSUFFICIENT_DATA);
        }

        let mean = self.calculate_mean();
        let std = self.calculate_std();

        if std == 0.0 {
            return AnomalyResult::unavailable(method, threshold, reason::ZERO_VARIANCE);
        }

        let zscore = (value - mean).abs() / std;
        debug!(value, mean, std, zscore, "zscore evaluated");

        ResultBuilder::new(method)
            .anomaly(zscore > threshold)
            .score(zscore)
            .threshold(threshold)
            .detail("mean", mean)
            .detail("std", std)
            .detail("zscore", zscore)
            .build()
    }

    pub fn iqr_detection(&mut self, value: f64, multiplier: f64) -> AnomalyResult {
        let method = DetectionMethod::Iqr.as_str();
        self.add_point(value);

        if self.window.len() < 4 {
            return AnomalyResult::unavailable(method, 0.0, reason::INSUFFICIENT_DATA);
        }

        let sorted = self.window.sorted();
        let n = sorted.len();
        let q1 = sorted[n / 4];
        let q3 = sorted[3 * n / 4];
        let iqr = q3 - q1;

        let lower_bound = q1 - multiplier * iqr;
        let upper_bound = q3 + multiplier * iqr;
        let is_anomaly = value < lower_bound || value > upper_bound;

        let score = if is_anomaly && iqr > 0.0 {
            (value - lower_bound).abs().min((value - upper_bound).abs()) / iqr
        } else {
            0.0
        };
        debug!(value, q1, q3, iqr, score, "iqr evaluated");

        ResultBuilder::new(method)
            .anomaly(is_anomaly)
            .score(score)
            .threshold(multiplier)
            .detail("q1", q1)
            .detail("q3", q3)
            .detail("iqr", iqr)
            .detail("lower_bound", lower_bound)
            .detail("upper_bound", upper_bound)
            .build()
    }

    pub fn mad_detection(&mut self, value: f64, threshold: f64) -> AnomalyResult {
        let method = DetectionMethod::Mad.as_str();
        self.add_point(value);

        if self.window.len() < 2 {
            return AnomalyResult::unavailable(method, threshold, reason::INSUFFICIENT_DATA);
        }

        let sorted = self.window.sorted();
        let median = stats::index_median(&sorted).unwrap_or(value);

        let mut deviations: Vec<f64> = sorted.iter().map(|x| (x - median).abs()).collect();
        deviations.sort_by(f64::total_cmp);
        let mut mad = stats::index_median(&deviations).unwrap_or(0.0);
        if mad == 0.0 {
            mad = 1.0;
        }

        let modified_zscore = MAD_SCALE * (value - median).abs() / mad;
        debug!(value, median, mad, modified_zscore, "mad evaluated");

        ResultBuilder::new(method)
            .anomaly(modified_zscore > threshold)
            .score(modified_zscore)
            .threshold(threshold)
            .detail("median", median)
            .detail("mad", mad)
            .detail("modified_zscore", modified_zscore)
            .build()
    }
}

impl Default for StatisticalDetector {
    fn default() -> Self {
        Self::from_config(&StatisticalConfig::default())
    }
}

impl Detector for StatisticalDetector {
    fn name(&self) -> &'static str {
        "statistical"
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}
