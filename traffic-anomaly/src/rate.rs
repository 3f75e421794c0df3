//! Sudden changes in the first derivative of a timestamped series.

use crate::{stats, BoundedWindow, Detector, RateChangeConfig};
use tracing::debug;
use traffic_core::{reason, AnomalyResult, DetectionMethod, ResultBuilder};

#[derive(Debug, Clone)]
pub struct RateChangeDetector {
    timestamps: BoundedWindow,
    values: BoundedWindow,
}

impl RateChangeDetector {
    pub fn new(window_size: usize) -> Self {
        Self {
            timestamps: BoundedWindow::new(window_size),
            values: BoundedWindow::new(window_size),
        }
    }

    pub fn from_config(config: &RateChangeConfig) -> Self {
        Self::new(config.window_size)
    }

    /// Pairs with a non-finite timestamp or value are dropped whole so the
    /// two windows stay aligned.
    pub fn add_point(&mut self, timestamp: f64, value: f64) {
        if !timestamp.is_finite() || !value.is_finite() {
            debug!(timestamp, value, "non-finite rate sample dropped");
            return;
        }
        self.timestamps.push(timestamp);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `Δvalue / Δtimestamp` for each consecutive pair whose timestamps
    /// strictly increase.
    pub fn rates(&self) -> Vec<f64> {
        let timestamps = self.timestamps.to_vec();
        let values = self.values.to_vec();
        timestamps
            .windows(2)
            .zip(values.windows(2))
            .filter_map(|(t, v)| {
                let dt = t[1] - t[0];
                (dt > 0.0).then(|| (v[1] - v[0]) / dt)
            })
            .collect()
    }

    pub fn detect_rate_change(&self, threshold: f64) -> AnomalyResult {
        let method = DetectionMethod::RateChange.as_str();

        if self.values.len() < 3 {
            return AnomalyResult::unavailable(method, threshold, reason::INSUFFICIENT_DATA);
        }

        let rates = self.rates();
        let Some(&current_rate) = rates.last() else {
            return AnomalyResult::unavailable(method, threshold, reason::NO_RATE_DATA);
        };

        let (mean_rate, std_rate) = stats::mean_and_floored_std(&rates);
        let zscore = (current_rate - mean_rate).abs() / std_rate;
        debug!(current_rate, mean_rate, std_rate, zscore, "rate change evaluated");

        ResultBuilder::new(method)
            .anomaly(zscore > threshold)
            .score(zscore)
            .threshold(threshold)
            .detail("current_rate", current_rate)
            .detail("mean_rate", mean_rate)
            .detail("std_rate", std_rate)
            .detail("zscore", zscore)
            .build()
    }
}

impl Default for RateChangeDetector {
    fn default() -> Self {
        Self::from_config(&RateChangeConfig::default())
    }
}

impl Detector for RateChangeDetector {
    fn name(&self) -> &'static str {
        "rate_change"
    }

    fn reset(&mut self) {
        self.timestamps.clear();
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector_with(points: &[(f64, f64)]) -> RateChangeDetector {
        let mut detector = RateChangeDetector::new(10);
        for &(timestamp, value) in points {
            detector.add_point(timestamp, value);
        }
        detector
    }

    #[test]
    fn test_needs_three_points() {
        let detector = detector_with(&[(0.0, 1.0), (1.0, 2.0)]);
        let result = detector.detect_rate_change(2.0);
        assert!(!result.is_anomaly);
        assert_eq!(result.reason(), Some("insufficient_data"));
    }

    #[test]
    fn test_no_rate_data_without_time_progress() {
        let detector = detector_with(&[(5.0, 1.0), (5.0, 2.0), (4.0, 3.0)]);
        let result = detector.detect_rate_change(2.0);
        assert!(!result.is_anomaly);
        assert_eq!(result.reason(), Some("no_rate_data"));
    }

    #[test]
    fn test_rates_skip_non_increasing_timestamps() {
        let detector = detector_with(&[(0.0, 0.0), (2.0, 10.0), (2.0, 50.0), (4.0, 60.0)]);
        assert_eq!(detector.rates(), vec![5.0, 5.0]);
    }

    #[test]
    fn test_three_point_spike_sits_on_the_boundary() {
        // Two rates, [0, 990]: the last one is exactly one standard deviation out.
        let detector = detector_with(&[(0.0, 10.0), (1.0, 10.0), (2.0, 1000.0)]);
        let result = detector.detect_rate_change(0.5);
        assert!(result.is_anomaly);
        assert!((result.score - 1.0).abs() < 1e-9);
        assert_eq!(result.detail_f64("current_rate"), Some(990.0));
    }

    #[test]
    fn test_rate_spike_detected() {
        let detector = detector_with(&[
            (0.0, 10.0),
            (1.0, 10.0),
            (2.0, 10.0),
            (3.0, 10.0),
            (4.0, 1000.0),
        ]);
        let result = detector.detect_rate_change(1.0);
        assert!(result.is_anomaly);
        assert!((result.score - 3f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_steady_ramp_is_not_anomalous() {
        let points: Vec<(f64, f64)> = (0..8).map(|i| (i as f64, 3.0 * i as f64)).collect();
        let result = detector_with(&points).detect_rate_change(2.0);
        assert!(!result.is_anomaly);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.detail_f64("std_rate"), Some(1.0));
    }

    #[test]
    fn test_non_finite_pairs_are_dropped_together() {
        let detector = detector_with(&[
            (0.0, 10.0),
            (1.0, f64::NAN),
            (f64::NAN, 20.0),
            (2.0, 30.0),
        ]);
        assert_eq!(detector.len(), 2);
        assert_eq!(detector.rates(), vec![10.0]);
    }

    #[test]
    fn test_window_keeps_latest_pairs() {
        let mut detector = RateChangeDetector::new(3);
        for i in 0..6 {
            detector.add_point(i as f64, i as f64 * 10.0);
        }
        assert_eq!(detector.len(), 3);
        assert_eq!(detector.rates(), vec![10.0, 10.0]);
    }
}
