use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single observation of a gateway metric.
///
/// `timestamp` is in seconds; only differences between timestamps matter to
/// the rate-of-change detector. `pattern_key` selects the learned behavioural
/// baseline the value is compared against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: f64,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_key: Option<String>,
}

impl DataPoint {
    pub fn new(timestamp: f64, value: f64) -> Self {
        Self {
            timestamp,
            value,
            pattern_key: None,
        }
    }

    /// Stamp `value` with the current wall-clock time.
    pub fn now(value: f64) -> Self {
        Self::at(Utc::now(), value)
    }

    pub fn at(time: DateTime<Utc>, value: f64) -> Self {
        let timestamp = time.timestamp_micros() as f64 / 1_000_000.0;
        Self::new(timestamp, value)
    }

    pub fn with_pattern(mut self, pattern_key: impl Into<String>) -> Self {
        self.pattern_key = Some(pattern_key.into());
        self
    }
}
