use crate::{AnomalyDetectionPipeline, DetectionResults, PipelineConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use traffic_core::{AnomalyResult, DataPoint, DetectionMethod};

/// One pipeline per monitored metric, created lazily from a shared config.
///
/// The map lock is held only long enough to find or insert a pipeline; each
/// pipeline has its own lock, so detections on different metrics do not
/// contend with each other.
pub struct PipelineManager {
    pipelines: RwLock<HashMap<String, Arc<Mutex<AnomalyDetectionPipeline>>>>,
    config: PipelineConfig,
}

impl PipelineManager {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn get_or_create(&self, metric: &str) -> Arc<Mutex<AnomalyDetectionPipeline>> {
        if let Some(pipeline) = self.pipelines.read().get(metric) {
            return Arc::clone(pipeline);
        }

        let mut pipelines = self.pipelines.write();
        let pipeline = pipelines.entry(metric.to_string()).or_insert_with(|| {
            debug!(metric, "creating pipeline");
            Arc::new(Mutex::new(AnomalyDetectionPipeline::from_config(
                self.config.clone(),
            )))
        });
        Arc::clone(pipeline)
    }

    pub fn train(&self, metric: &str, data: &[f64]) {
        self.get_or_create(metric).lock().train(data);
    }

    pub fn learn_pattern(&self, metric: &str, pattern_key: &str, values: &[f64]) {
        self.get_or_create(metric)
            .lock()
            .learn_pattern(pattern_key, values);
    }

    /// Per-method results plus the ensemble verdict for one point.
    pub fn process(
        &self,
        metric: &str,
        point: &DataPoint,
        methods: Option<&[DetectionMethod]>,
    ) -> (DetectionResults, AnomalyResult) {
        let pipeline = self.get_or_create(metric);
        let mut pipeline = pipeline.lock();
        let results = pipeline.detect_point(point, methods);
        let ensemble = pipeline.aggregate_results(&results);
        (results, ensemble)
    }

    pub fn detect(
        &self,
        metric: &str,
        value: f64,
        methods: Option<&[DetectionMethod]>,
    ) -> AnomalyResult {
        self.process(metric, &DataPoint::now(value), methods).1
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.pipelines.read().contains_key(metric)
    }

    pub fn metric_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.pipelines.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn reset(&self, metric: &str) -> bool {
        match self.pipelines.read().get(metric) {
            Some(pipeline) => {
                pipeline.lock().reset();
                true
            }
            None => false,
        }
    }

    /// Reset every pipeline in place; metric keys stay registered.
    pub fn reset_all(&self) {
        for pipeline in self.pipelines.read().values() {
            pipeline.lock().reset();
        }
    }

    pub fn remove(&self, metric: &str) -> bool {
        self.pipelines.write().remove(metric).is_some()
    }

    pub fn clear(&self) {
        self.pipelines.write().clear();
    }
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}
