use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Loose diagnostic payload attached to every result.
pub type Details = Map<String, Value>;

/// Verdict of a single detector, or of the ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub is_anomaly: bool,
    pub score: f64,
    pub threshold: f64,
    pub method: String,
    pub details: Details,
}

impl AnomalyResult {
    /// Non-anomalous result explaining why no score could be computed.
    pub fn unavailable(method: impl Into<String>, threshold: f64, reason: &str) -> Self {
        ResultBuilder::new(method)
            .threshold(threshold)
            .detail("reason", reason)
            .build()
    }

    pub fn reason(&self) -> Option<&str> {
        self.details.get("reason").and_then(Value::as_str)
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn detail_f64(&self, key: &str) -> Option<f64> {
        self.details.get(key).and_then(Value::as_f64)
    }
}

pub struct ResultBuilder {
    method: String,
    is_anomaly: bool,
    score: f64,
    threshold: f64,
    details: Details,
}

impl ResultBuilder {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            is_anomaly: false,
            score: 0.0,
            threshold: 0.0,
            details: Details::new(),
        }
    }

    pub fn anomaly(mut self, is_anomaly: bool) -> Self {
        self.is_anomaly = is_anomaly;
        self
    }

    pub fn score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> AnomalyResult {
        AnomalyResult {
            is_anomaly: self.is_anomaly,
            score: self.score,
            threshold: self.threshold,
            method: self.method,
            details: self.details,
        }
    }
}
