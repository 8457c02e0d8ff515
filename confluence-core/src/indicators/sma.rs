//! Simple Moving Average (SMA) and rolling window extremes.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        sma_of_series(&closes, self.period)
    }
}

/// Rolling mean; any NaN inside the window yields NaN for that position.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for end in period..=n {
        let window = &values[end - period..end];
        if window.iter().all(|v| v.is_finite()) {
            result[end - 1] = window.iter().sum::<f64>() / period as f64;
        }
    }
    result
}

/// Rolling maximum over `period` values ending at each index (NaN during warmup).
pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    rolling_fold(values, period, f64::max)
}

/// Rolling minimum over `period` values ending at each index (NaN during warmup).
pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    rolling_fold(values, period, f64::min)
}

fn rolling_fold(values: &[f64], period: usize, fold: fn(f64, f64) -> f64) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for end in period..=n {
        let window = &values[end - period..end];
        if window.iter().all(|v| v.is_finite()) {
            result[end - 1] = window.iter().copied().reduce(fold).unwrap_or(f64::NAN);
        }
    }
    result
}
