//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (alpha = 1/period), seeded with the mean of the
//! first `period` true ranges that have a previous close.

use super::Indicator;
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// ATR value at the last candle, or `None` if still warming up.
    pub fn latest(&self, candles: &[Candle]) -> Option<f64> {
        self.compute(candles)
            .last()
            .copied()
            .filter(|v| v.is_finite())
    }
}

/// True Range series. TR[0] is NaN because there is no previous close.
pub fn true_range(candles: &[Candle]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; candles.len()];
    for i in 1..candles.len() {
        let h = candles[i].high;
        let l = candles[i].low;
        let pc = candles[i - 1].close;
        tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
    }
    tr
}

/// Wilder smoothing. Seed: mean of the first `period` consecutive valid values.
/// A NaN after the seed poisons the rest of the series.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let Some(seed_start) = (0..=n - period)
        .find(|&i| values[i..i + period].iter().all(|v| v.is_finite()))
    else {
        return result;
    };
    let seed_end = seed_start + period;
    let seed = values[seed_start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if !values[i].is_finite() {
            break;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, candles: &[Candle]) -> Vec<f64> {
        wilder_smooth(&true_range(candles), self.period)
    }
}
