//! Per-pattern learned baselines with a Z-score deviation test.
//!
//! A pattern key is opaque to the detector: a route, a client id, an hour of
//! the week, whatever the caller wants to baseline separately.

use crate::{stats, BehavioralConfig, BoundedWindow, Detector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use traffic_core::{reason, AnomalyResult, DetectionMethod, ResultBuilder};

/// How a baseline absorbs newly learned values.
///
/// `Recompute` rebuilds the statistics from every retained value on each
/// `learn_pattern` call. `Welford` folds values into a running accumulator in
/// O(1) per value and retains nothing, so its rounding can differ slightly
/// from `Recompute` on the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineUpdate {
    #[default]
    Recompute,
    Welford,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternBaseline {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl PatternBaseline {
    fn from_window(window: &BoundedWindow) -> Self {
        let (min, max) = window
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &x| {
                (min.min(x), max.max(x))
            });
        Self {
            mean: stats::mean(window.iter()),
            std: stats::population_std_dev(window.iter()),
            min,
            max,
            count: window.len(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn baseline(&self) -> PatternBaseline {
        let variance = if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0)
        };
        PatternBaseline {
            mean: self.mean,
            std: variance.sqrt(),
            min: self.min,
            max: self.max,
            count: self.count,
        }
    }
}

#[derive(Debug, Clone)]
enum PatternHistory {
    Retained(BoundedWindow),
    Running(RunningStats),
}

#[derive(Debug, Clone)]
struct Pattern {
    history: PatternHistory,
    baseline: PatternBaseline,
}

#[derive(Debug, Clone)]
pub struct BehavioralDetector {
    update: BaselineUpdate,
    max_history: usize,
    patterns: HashMap<String, Pattern>,
}

impl BehavioralDetector {
    pub fn new(update: BaselineUpdate, max_history: usize) -> Self {
        Self {
            update,
            max_history,
            patterns: HashMap::new(),
        }
    }

    pub fn from_config(config: &BehavioralConfig) -> Self {
        Self::new(config.update, config.max_history)
    }

    /// Fold `values` into the baseline for `pattern_key`. Non-finite values
    /// are ignored; a key is only registered once it retains a value.
    pub fn learn_pattern(&mut self, pattern_key: &str, values: &[f64]) {
        let values: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return;
        }
        if self.update == BaselineUpdate::Recompute && self.max_history == 0 {
            warn!(pattern_key, "max_history is 0; pattern not learned");
            return;
        }

        let update = self.update;
        let max_history = self.max_history;
        let pattern = self
            .patterns
            .entry(pattern_key.to_string())
            .or_insert_with(|| Pattern {
                history: match update {
                    BaselineUpdate::Recompute => {
                        PatternHistory::Retained(BoundedWindow::new(max_history))
                    }
                    BaselineUpdate::Welford => PatternHistory::Running(RunningStats::default()),
                },
                baseline: RunningStats::default().baseline(),
            });

        pattern.baseline = match &mut pattern.history {
            PatternHistory::Retained(window) => {
                window.extend(values.iter().copied());
                PatternBaseline::from_window(window)
            }
            PatternHistory::Running(running) => {
                for &value in &values {
                    running.push(value);
                }
                running.baseline()
            }
        };

        debug!(
            pattern_key,
            learned = values.len(),
            count = pattern.baseline.count,
            mean = pattern.baseline.mean,
            std = pattern.baseline.std,
            "pattern baseline updated"
        );
    }

    pub fn baseline(&self, pattern_key: &str) -> Option<&PatternBaseline> {
        self.patterns.get(pattern_key).map(|pattern| &pattern.baseline)
    }

    pub fn pattern_keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.patterns.keys().map(String::as_str)
    }

    pub fn forget(&mut self, pattern_key: &str) -> bool {
        self.patterns.remove(pattern_key).is_some()
    }

    pub fn detect_deviation(&self, pattern_key: &str, value: f64, threshold: f64) -> AnomalyResult {
        let method = DetectionMethod::Behavioral.as_str();

        let Some(baseline) = self.baseline(pattern_key) else {
            return AnomalyResult::unavailable(method, threshold, reason::PATTERN_NOT_LEARNED);
        };

        let std = if baseline.std == 0.0 { 1.0 } else { baseline.std };
        let zscore = (value - baseline.mean).abs() / std;
        debug!(pattern_key, value, zscore, "behavioral deviation evaluated");

        ResultBuilder::new(method)
            .anomaly(zscore > threshold)
            .score(zscore)
            .threshold(threshold)
            .detail("pattern_key", pattern_key)
            .detail("expected_mean", baseline.mean)
            .detail("expected_std", std)
            .detail("zscore", zscore)
            .build()
    }
}

impl Default for BehavioralDetector {
    fn default() -> Self {
        Self::from_config(&BehavioralConfig::default())
    }
}

impl Detector for BehavioralDetector {
    fn name(&self) -> &'static str {
        "behavioral"
    }

    fn reset(&mut self) {
        self.patterns.clear();
    }
}
