pub mod model;
pub mod result;

pub use model::DataPoint;
pub use result::{AnomalyResult, Details, ResultBuilder};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnomalyError {
    #[error("Unknown detection method: {0}")]
    UnknownMethod(String),

    #[error("Invalid parameter: {name} - {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnomalyError>;

/// Every detector the pipeline can dispatch to, in canonical run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Zscore,
    Iqr,
    Mad,
    IsolationForest,
    TimeSeries,
    Behavioral,
    RateChange,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 7] = [
        DetectionMethod::Zscore,
        DetectionMethod::Iqr,
        DetectionMethod::Mad,
        DetectionMethod::IsolationForest,
        DetectionMethod::TimeSeries,
        DetectionMethod::Behavioral,
        DetectionMethod::RateChange,
    ];

    /// Methods run when the caller does not choose any.
    pub const DEFAULT: [DetectionMethod; 4] = [
        DetectionMethod::Zscore,
        DetectionMethod::Iqr,
        DetectionMethod::Mad,
        DetectionMethod::IsolationForest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Zscore => "zscore",
            DetectionMethod::Iqr => "iqr",
            DetectionMethod::Mad => "mad",
            DetectionMethod::IsolationForest => "isolation_forest",
            DetectionMethod::TimeSeries => "time_series",
            DetectionMethod::Behavioral => "behavioral",
            DetectionMethod::RateChange => "rate_change",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = AnomalyError;

    fn from_str(s: &str) -> Result<Self> {
        DetectionMethod::ALL
            .iter()
            .copied()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| AnomalyError::UnknownMethod(s.to_string()))
    }
}

/// Machine-readable reasons carried in `details["reason"]` when a detector
/// cannot compute a verdict.
pub mod reason {
    pub const INSUFFICIENT_DATA: &str = "insufficient_data";
    pub const ZERO_VARIANCE: &str = "zero_variance";
    pub const NOT_TRAINED: &str = "not_trained";
    pub const NO_RATE_DATA: &str = "no_rate_data";
    pub const PATTERN_NOT_LEARNED: &str = "pattern_not_learned";
}
