//! Additive seasonal decomposition with a Z-score test on the residual.

use crate::{stats, BoundedWindow, Detector, TimeSeriesConfig};
use tracing::debug;
use traffic_core::{reason, AnomalyResult, DetectionMethod, ResultBuilder};

/// `history = trend + seasonal + residual`, element by element.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub trend: Vec<f64>,
    pub seasonal: Vec<f64>,
    pub residual: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct TimeSeriesDetector {
    seasonality: usize,
    history: BoundedWindow,
}

impl TimeSeriesDetector {
    /// History is capped at `seasonality * history_periods` values, never
    /// fewer than the two periods decomposition needs.
    pub fn new(seasonality: usize, history_periods: usize) -> Self {
        let seasonality = seasonality.max(1);
        Self {
            seasonality,
            history: BoundedWindow::new(seasonality * history_periods.max(2)),
        }
    }

    pub fn from_config(config: &TimeSeriesConfig) -> Self {
        Self::new(config.seasonality, config.history_periods)
    }

    pub fn seasonality(&self) -> usize {
        self.seasonality
    }

    pub fn history(&self) -> &BoundedWindow {
        &self.history
    }

    pub fn add_point(&mut self, value: f64) {
        self.history.push(value);
    }

    pub fn seasonal_decompose(&self) -> Decomposition {
        let history = self.history.to_vec();
        let n = history.len();
        let period = self.seasonality;

        if n < period * 2 {
            return Decomposition {
                trend: history,
                seasonal: vec![0.0; n],
                residual: vec![0.0; n],
            };
        }

        // Moving average over exactly `period` points, `history[i - half..i - half + period]`.
        // For even periods that window sits one point left of center; no
        // `period + 1` wide window is used. The first and last `half` points
        // have no full window and pass through.
        let half = period / 2;
        let trend: Vec<f64> = (0..n)
            .map(|i| {
                if i < half || i >= n - half {
                    history[i]
                } else {
                    let start = i - half;
                    history[start..start + period].iter().sum::<f64>() / period as f64
                }
            })
            .collect();

        let detrended: Vec<f64> = history.iter().zip(&trend).map(|(x, t)| x - t).collect();

        let mut seasonal = vec![0.0; n];
        for phase in 0..period {
            let phase_values: Vec<f64> =
                detrended.iter().skip(phase).step_by(period).copied().collect();
            let avg = stats::mean(&phase_values);
            for slot in seasonal.iter_mut().skip(phase).step_by(period) {
                *slot = avg;
            }
        }

        let residual = (0..n).map(|i| history[i] - trend[i] - seasonal[i]).collect();

        Decomposition {
            trend,
            seasonal,
            residual,
        }
    }

    pub fn detect_anomaly(&mut self, value: f64, threshold: f64) -> AnomalyResult {
        let method = DetectionMethod::TimeSeries.as_str();
        self.add_point(value);

        if self.history.len() < self.seasonality * 2 {
            return AnomalyResult::unavailable(method, threshold, reason::INSUFFICIENT_DATA);
        }

        let Decomposition {
            trend,
            seasonal,
            residual,
        } = self.seasonal_decompose();

        let (residual_mean, residual_std) = stats::mean_and_floored_std(&residual);
        let current_residual = residual.last().copied().unwrap_or(0.0);
        let zscore = (current_residual - residual_mean).abs() / residual_std;
        debug!(value, current_residual, residual_std, zscore, "time series evaluated");

        ResultBuilder::new(method)
            .anomaly(zscore > threshold)
            .score(zscore)
            .threshold(threshold)
            .detail("trend", trend.last().copied().unwrap_or(value))
            .detail("seasonal", seasonal.last().copied().unwrap_or(0.0))
            .detail("residual", current_residual)
            .detail("zscore", zscore)
            .build()
    }
}

impl Default for TimeSeriesDetector {
    fn default() -> Self {
        Self::from_config(&TimeSeriesConfig::default())
    }
}

impl Detector for TimeSeriesDetector {
    fn name(&self) -> &'static str {
        "time_series"
    }

    fn reset(&mut self) {
        self.history.clear();
    }
}
