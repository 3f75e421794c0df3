//! Ensemble pipeline: one instance of every detector, a name-to-detector
//! registry for dispatch, and majority-vote aggregation.

use crate::{
    BehavioralDetector, Detector, IsolationForest, PipelineConfig, RateChangeDetector,
    StatisticalDetector, TimeSeriesDetector,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use traffic_core::{AnomalyResult, DataPoint, DetectionMethod, ResultBuilder, Result};

/// Per-method results keyed by method name, in canonical run order.
pub type DetectionResults = IndexMap<String, AnomalyResult>;

pub struct AnomalyDetectionPipeline {
    config: PipelineConfig,
    statistical: StatisticalDetector,
    isolation_forest: IsolationForest,
    time_series: TimeSeriesDetector,
    behavioral: BehavioralDetector,
    rate_change: RateChangeDetector,
    training_data: Vec<f64>,
}

impl AnomalyDetectionPipeline {
    pub fn new() -> Self {
        Self::from_config(PipelineConfig::default())
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            statistical: StatisticalDetector::from_config(&config.statistical),
            isolation_forest: IsolationForest::from_config(config.isolation_forest.clone()),
            time_series: TimeSeriesDetector::from_config(&config.time_series),
            behavioral: BehavioralDetector::from_config(&config.behavioral),
            rate_change: RateChangeDetector::from_config(&config.rate_change),
            training_data: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn statistical(&self) -> &StatisticalDetector {
        &self.statistical
    }

    pub fn isolation_forest(&self) -> &IsolationForest {
        &self.isolation_forest
    }

    pub fn time_series(&self) -> &TimeSeriesDetector {
        &self.time_series
    }

    pub fn behavioral(&self) -> &BehavioralDetector {
        &self.behavioral
    }

    pub fn rate_change(&self) -> &RateChangeDetector {
        &self.rate_change
    }

    pub fn training_data(&self) -> &[f64] {
        &self.training_data
    }

    /// Fit the forest on `data` and seed the statistical window with it.
    /// Only the last `window_size` values survive in the window.
    pub fn train(&mut self, data: &[f64]) {
        self.training_data = data.to_vec();
        self.isolation_forest.fit(data);
        for &value in data {
            self.statistical.add_point(value);
        }
        debug!(points = data.len(), "pipeline trained");
    }

    pub fn learn_pattern(&mut self, pattern_key: &str, values: &[f64]) {
        self.behavioral.learn_pattern(pattern_key, values);
    }

    /// Feed the rate-of-change window without evaluating it.
    pub fn observe_rate(&mut self, timestamp: f64, value: f64) {
        self.rate_change.add_point(timestamp, value);
    }

    /// Run `methods` (or the configured defaults) against `value`, stamped
    /// with the current time.
    pub fn detect(&mut self, value: f64, methods: Option<&[DetectionMethod]>) -> DetectionResults {
        self.detect_point(&DataPoint::now(value), methods)
    }

    pub fn detect_point(
        &mut self,
        point: &DataPoint,
        methods: Option<&[DetectionMethod]>,
    ) -> DetectionResults {
        let requested = match methods {
            Some(methods) => methods.to_vec(),
            None => self.config.default_methods.clone(),
        };

        DetectionMethod::ALL
            .into_iter()
            .filter(|method| requested.contains(method))
            .map(|method| (method.as_str().to_string(), self.run_method(method, point)))
            .collect()
    }

    /// String-keyed entry point; rejects names with no registered detector.
    pub fn detect_named(&mut self, value: f64, names: &[&str]) -> Result<DetectionResults> {
        let methods = names
            .iter()
            .map(|name| name.parse::<DetectionMethod>())
            .collect::<Result<Vec<_>>>()
            .inspect_err(|err| warn!(%err, "rejected detection request"))?;
        Ok(self.detect(value, Some(&methods)))
    }

    fn run_method(&mut self, method: DetectionMethod, point: &DataPoint) -> AnomalyResult {
        let threshold = self.config.thresholds.for_method(method);
        match method {
            DetectionMethod::Zscore => self.statistical.zscore_detection(point.value, threshold),
            DetectionMethod::Iqr => self.statistical.iqr_detection(point.value, threshold),
            DetectionMethod::Mad => self.statistical.mad_detection(point.value, threshold),
            DetectionMethod::IsolationForest => self.isolation_forest.predict(point.value, threshold),
            DetectionMethod::TimeSeries => self.time_series.detect_anomaly(point.value, threshold),
            DetectionMethod::Behavioral => {
                let pattern_key = point
                    .pattern_key
                    .as_deref()
                    .unwrap_or(&self.config.default_pattern);
                self.behavioral
                    .detect_deviation(pattern_key, point.value, threshold)
            }
            DetectionMethod::RateChange => {
                self.rate_change.add_point(point.timestamp, point.value);
                self.rate_change.detect_rate_change(threshold)
            }
        }
    }

    /// Strict-majority vote over `results` with the mean score.
    pub fn aggregate_results(&self, results: &DetectionResults) -> AnomalyResult {
        let total = results.len();
        let anomaly_count = results.values().filter(|r| r.is_anomaly).count();
        let avg_score = if total > 0 {
            results.values().map(|r| r.score).sum::<f64>() / total as f64
        } else {
            0.0
        };
        let is_anomaly = anomaly_count * 2 > total;

        let methods: Map<String, Value> = results
            .iter()
            .map(|(name, result)| (name.clone(), Value::Bool(result.is_anomaly)))
            .collect();

        if is_anomaly {
            info!(
                anomaly_count,
                total_methods = total,
                score = avg_score,
                flagged = ?results
                    .iter()
                    .filter(|(_, r)| r.is_anomaly)
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>(),
                "ensemble anomaly detected"
            );
        }

        ResultBuilder::new("ensemble")
            .anomaly(is_anomaly)
            .score(avg_score)
            .threshold(0.5)
            .detail("anomaly_count", anomaly_count as u64)
            .detail("total_methods", total as u64)
            .detail("methods", Value::Object(methods))
            .build()
    }

    /// Forget every observation, learned baseline and fitted tree.
    pub fn reset(&mut self) {
        let detectors: [&mut dyn Detector; 5] = [
            &mut self.statistical,
            &mut self.isolation_forest,
            &mut self.time_series,
            &mut self.behavioral,
            &mut self.rate_change,
        ];
        for detector in detectors {
            detector.reset();
            debug!(detector = detector.name(), "detector reset");
        }
        self.training_data.clear();
    }
}

impl Default for AnomalyDetectionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traffic_core::AnomalyError;

    fn result(method: &str, is_anomaly: bool, score: f64) -> AnomalyResult {
        ResultBuilder::new(method)
            .anomaly(is_anomaly)
            .score(score)
            .build()
    }

    fn results(entries: &[(&str, bool, f64)]) -> DetectionResults {
        entries
            .iter()
            .map(|&(name, is_anomaly, score)| (name.to_string(), result(name, is_anomaly, score)))
            .collect()
    }

    #[test]
    fn test_majority_vote_and_mean_score() {
        let pipeline = AnomalyDetectionPipeline::new();
        let ensemble = pipeline.aggregate_results(&results(&[
            ("zscore", true, 0.9),
            ("iqr", true, 0.8),
            ("mad", true, 0.7),
            ("isolation_forest", false, 0.1),
        ]));

        assert!(ensemble.is_anomaly);
        assert!((ensemble.score - 0.625).abs() < 1e-12);
        assert_eq!(ensemble.threshold, 0.5);
        assert_eq!(ensemble.method, "ensemble");
        assert_eq!(ensemble.details["anomaly_count"], 3);
        assert_eq!(ensemble.details["total_methods"], 4);
        assert_eq!(ensemble.details["methods"]["isolation_forest"], false);
        assert_eq!(ensemble.details["methods"]["zscore"], true);
    }

    #[test]
    fn test_tie_is_not_a_majority() {
        let pipeline = AnomalyDetectionPipeline::new();
        let ensemble = pipeline.aggregate_results(&results(&[
            ("zscore", true, 4.0),
            ("iqr", true, 2.0),
            ("mad", false, 1.0),
            ("isolation_forest", false, 0.5),
        ]));
        assert!(!ensemble.is_anomaly);
    }

    #[test]
    fn test_aggregate_of_nothing() {
        let pipeline = AnomalyDetectionPipeline::new();
        let ensemble = pipeline.aggregate_results(&DetectionResults::new());
        assert!(!ensemble.is_anomaly);
        assert_eq!(ensemble.score, 0.0);
        assert_eq!(ensemble.details["total_methods"], 0);
    }

    #[test]
    fn test_default_methods_in_canonical_order() {
        let mut pipeline = AnomalyDetectionPipeline::new();
        let results = pipeline.detect(1.0, None);
        let names: Vec<&str> = results.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zscore", "iqr", "mad", "isolation_forest"]);
        assert_eq!(results["isolation_forest"].reason(), Some("not_trained"));
    }

    #[test]
    fn test_requested_order_does_not_change_run_order() {
        let mut pipeline = AnomalyDetectionPipeline::new();
        let results = pipeline.detect(
            1.0,
            Some(&[DetectionMethod::Mad, DetectionMethod::Zscore, DetectionMethod::Mad]),
        );
        let names: Vec<&str> = results.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zscore", "mad"]);
        // Each statistical test pushes the value once.
        assert_eq!(pipeline.statistical().window().len(), 2);
    }

    #[test]
    fn test_every_method_is_dispatchable() {
        let mut pipeline = AnomalyDetectionPipeline::new();
        let results = pipeline.detect(1.0, Some(&DetectionMethod::ALL));
        assert_eq!(results.len(), DetectionMethod::ALL.len());
        assert_eq!(results["time_series"].reason(), Some("insufficient_data"));
        assert_eq!(results["behavioral"].reason(), Some("pattern_not_learned"));
        assert_eq!(results["rate_change"].reason(), Some("insufficient_data"));
    }

    #[test]
    fn test_detect_named_rejects_unknown_method() {
        let mut pipeline = AnomalyDetectionPipeline::new();
        let err = pipeline.detect_named(1.0, &["zscore", "lstm"]).unwrap_err();
        assert!(matches!(err, AnomalyError::UnknownMethod(ref name) if name == "lstm"));
        // Nothing ran.
        assert!(pipeline.statistical().window().is_empty());

        let results = pipeline.detect_named(1.0, &["iqr"]).unwrap();
        assert!(results.contains_key("iqr"));
    }

    #[test]
    fn test_train_seeds_window_and_forest() {
        let mut pipeline = AnomalyDetectionPipeline::from_config(PipelineConfig {
            statistical: crate::StatisticalConfig { window_size: 10 },
            ..PipelineConfig::default()
        });
        let data: Vec<f64> = (0..25).map(|i| i as f64).collect();
        pipeline.train(&data);

        assert!(pipeline.isolation_forest().is_trained());
        assert_eq!(pipeline.training_data().len(), 25);
        assert_eq!(
            pipeline.statistical().window().to_vec(),
            (15..25).map(|i| i as f64).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_behavioral_dispatch_uses_point_key_then_default() {
        let mut pipeline = AnomalyDetectionPipeline::new();
        pipeline.learn_pattern("default", &[10.0, 11.0, 9.0, 10.0]);
        pipeline.learn_pattern("POST /login", &[100.0, 110.0, 90.0, 100.0]);

        let methods = [DetectionMethod::Behavioral];
        let keyed = DataPoint::new(0.0, 100.0).with_pattern("POST /login");
        let keyed = pipeline.detect_point(&keyed, Some(&methods));
        assert!(!keyed["behavioral"].is_anomaly);

        let unkeyed = pipeline.detect_point(&DataPoint::new(0.0, 100.0), Some(&methods));
        assert!(unkeyed["behavioral"].is_anomaly);
        assert_eq!(
            unkeyed["behavioral"].details["pattern_key"],
            Value::String("default".to_string())
        );
    }

    #[test]
    fn test_rate_change_dispatch_uses_point_timestamps() {
        let mut pipeline = AnomalyDetectionPipeline::new();
        for t in 0..6 {
            pipeline.observe_rate(t as f64, 10.0);
        }
        // Six rates with one outlier: z = sqrt(5), above the default 2.0.
        let spike = DataPoint::new(6.0, 1000.0);
        let results = pipeline.detect_point(&spike, Some(&[DetectionMethod::RateChange]));
        assert!(results["rate_change"].is_anomaly);
        assert_eq!(pipeline.rate_change().len(), 7);
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut pipeline = AnomalyDetectionPipeline::new();
        pipeline.train(&[1.0, 2.0, 3.0, 4.0]);
        pipeline.learn_pattern("k", &[1.0]);
        pipeline.reset();

        assert!(!pipeline.isolation_forest().is_trained());
        assert!(pipeline.statistical().window().is_empty());
        assert!(pipeline.behavioral().baseline("k").is_none());
        assert!(pipeline.training_data().is_empty());
    }
}
