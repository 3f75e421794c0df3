//! Summary statistics shared by the detectors.

use statrs::statistics::Statistics;
use std::borrow::Borrow;

/// Arithmetic mean; 0 for an empty input.
pub fn mean<I>(values: I) -> f64
where
    I: IntoIterator,
    I::Item: Borrow<f64>,
{
    let mut values = values.into_iter().peekable();
    if values.peek().is_none() {
        return 0.0;
    }
    values.mean()
}

/// Population (divide-by-n) standard deviation; 0 for an empty input.
pub fn population_std_dev<I>(values: I) -> f64
where
    I: IntoIterator,
    I::Item: Borrow<f64>,
{
    let mut values = values.into_iter().peekable();
    if values.peek().is_none() {
        return 0.0;
    }
    values.population_std_dev()
}

/// Upper median by simple index (`sorted[n / 2]`), no interpolation.
pub fn index_median(sorted: &[f64]) -> Option<f64> {
    sorted.get(sorted.len() / 2).copied()
}

/// Mean and population standard deviation, the latter floored to 1.0 when it
/// is zero.
pub fn mean_and_floored_std(values: &[f64]) -> (f64, f64) {
    let mean = mean(values);
    let std_dev = population_std_dev(values);
    (mean, if std_dev == 0.0 { 1.0 } else { std_dev })
}
