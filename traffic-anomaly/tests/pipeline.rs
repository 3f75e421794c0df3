use traffic_anomaly::{
    AnomalyDetectionPipeline, PipelineConfig, PipelineManager, SamplingStrategy, SplitPolicy,
    StatisticalConfig, TimeSeriesConfig,
};
use traffic_core::{DataPoint, DetectionMethod};

fn trending_traffic(points: usize) -> Vec<f64> {
    (0..points)
        .map(|i| 100.0 + i as f64 * 0.5 + (i % 10) as f64 * 2.0)
        .collect()
}

fn trained_pipeline() -> AnomalyDetectionPipeline {
    let mut pipeline = AnomalyDetectionPipeline::new();
    pipeline.train(&trending_traffic(200));
    pipeline
}

#[test]
fn test_spike_after_training_is_an_ensemble_anomaly() {
    let mut pipeline = trained_pipeline();
    let results = pipeline.detect(500.0, None);

    assert!(results["zscore"].is_anomaly);
    assert!(results["iqr"].is_anomaly);
    assert!(results["mad"].is_anomaly);

    let ensemble = pipeline.aggregate_results(&results);
    assert!(ensemble.is_anomaly);
    assert!(ensemble.details["anomaly_count"].as_u64().unwrap() >= 3);
}

#[test]
fn test_typical_value_is_not_an_ensemble_anomaly() {
    let mut pipeline = trained_pipeline();
    // Mean of the last 100 training values.
    let results = pipeline.detect(183.75, None);

    assert!(!results["zscore"].is_anomaly);
    assert!(!results["iqr"].is_anomaly);
    assert!(!results["mad"].is_anomaly);
    assert!(!pipeline.aggregate_results(&results).is_anomaly);
}

#[test]
fn test_window_never_exceeds_capacity() {
    let mut pipeline = AnomalyDetectionPipeline::from_config(PipelineConfig {
        statistical: StatisticalConfig { window_size: 25 },
        ..PipelineConfig::default()
    });
    pipeline.train(&trending_traffic(200));

    for value in trending_traffic(60) {
        pipeline.detect(value, Some(&[DetectionMethod::Zscore, DetectionMethod::Iqr]));
        assert!(pipeline.statistical().window().len() <= 25);
    }
    assert_eq!(pipeline.statistical().window().len(), 25);
}

#[test]
fn test_default_configuration_is_deterministic() {
    let mut a = trained_pipeline();
    let mut b = trained_pipeline();

    for value in [90.0, 150.0, 183.75, 230.0, 500.0] {
        let left = a.detect(value, None);
        let right = b.detect(value, None);
        for (name, result) in &left {
            assert_eq!(result.score.to_bits(), right[name].score.to_bits(), "{name}");
            assert_eq!(result.is_anomaly, right[name].is_anomaly, "{name}");
        }
    }
}

#[test]
fn test_seeded_random_forest_is_reproducible() {
    let config = PipelineConfig {
        isolation_forest: traffic_anomaly::IsolationForestConfig {
            sampling: SamplingStrategy::Bootstrap,
            split: SplitPolicy::UniformRandom,
            seed: 42,
            ..Default::default()
        },
        ..PipelineConfig::default()
    };
    let data = trending_traffic(300);

    let mut a = AnomalyDetectionPipeline::from_config(config.clone());
    let mut b = AnomalyDetectionPipeline::from_config(config);
    a.train(&data);
    b.train(&data);

    let methods = [DetectionMethod::IsolationForest];
    let left = a.detect(1_000.0, Some(&methods));
    let right = b.detect(1_000.0, Some(&methods));
    assert_eq!(left["isolation_forest"], right["isolation_forest"]);
}

#[test]
fn test_every_detector_reaches_a_verdict() {
    let mut pipeline = AnomalyDetectionPipeline::from_config(PipelineConfig {
        time_series: TimeSeriesConfig {
            seasonality: 4,
            history_periods: 10,
        },
        ..PipelineConfig::default()
    });
    pipeline.train(&trending_traffic(200));
    pipeline.learn_pattern("GET /checkout", &[120.0, 125.0, 118.0, 122.0]);

    let pattern = [0.0, 10.0, 0.0, -10.0];
    let mut last = None;
    for i in 0..12 {
        let point = DataPoint::new(i as f64, 180.0 + pattern[i % 4]).with_pattern("GET /checkout");
        last = Some(pipeline.detect_point(&point, Some(&DetectionMethod::ALL)));
    }

    let results = last.unwrap();
    assert_eq!(results.len(), DetectionMethod::ALL.len());
    for (name, result) in &results {
        assert!(result.reason().is_none(), "{name} gave no verdict");
        assert_eq!(&result.method, name);
    }
    // 180 sits far above the learned checkout baseline.
    assert!(results["behavioral"].is_anomaly);
}

#[test]
fn test_unavailable_reasons_before_any_data() {
    let mut pipeline = AnomalyDetectionPipeline::new();
    // The statistical tests share one window, so MAD already sees three points.
    let results = pipeline.detect_point(&DataPoint::new(0.0, 1.0), Some(&DetectionMethod::ALL));

    let reasons: Vec<(&str, Option<&str>)> = results
        .iter()
        .map(|(name, result)| (name.as_str(), result.reason()))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("zscore", Some("insufficient_data")),
            ("iqr", Some("insufficient_data")),
            ("mad", None),
            ("isolation_forest", Some("not_trained")),
            ("time_series", Some("insufficient_data")),
            ("behavioral", Some("pattern_not_learned")),
            ("rate_change", Some("insufficient_data")),
        ]
    );
    assert!(results.values().all(|result| !result.is_anomaly));
}

#[test]
fn test_results_serialize_with_stable_field_names() {
    let mut pipeline = trained_pipeline();
    let results = pipeline.detect(500.0, Some(&[DetectionMethod::Zscore]));
    let zscore = serde_json::to_value(&results["zscore"]).unwrap();

    assert_eq!(zscore["method"], "zscore");
    assert_eq!(zscore["is_anomaly"], true);
    assert_eq!(zscore["threshold"], 3.0);
    assert!(zscore["details"]["mean"].is_number());
}

#[test]
fn test_manager_keeps_metrics_apart() {
    let manager = PipelineManager::default();
    manager.train("requests_per_second", &trending_traffic(200));
    manager.train("error_rate", &[0.01, 0.02, 0.015, 0.01, 0.012, 0.018]);

    let spike = manager.detect("requests_per_second", 500.0, None);
    assert!(spike.is_anomaly);

    let calm = manager.detect("error_rate", 0.014, Some(&[DetectionMethod::Zscore]));
    assert!(!calm.is_anomaly);
    assert_eq!(manager.metric_keys().len(), 2);
}
