//! Fibonacci confluence: three bullish sub-checks OR-combined into one vote.
//!
//! 1. Structure: candle `k` closes within `fib_touch_pct` of the 61.8% level of
//!    the range between `low[k-1]` and `high[k-2]`, with a bullish body.
//! 2. Trend level: the 61.8% retracement of the rolling `trend_period`
//!    high/low window is crossed between the previous and current close by a
//!    bullish candle.
//! 3. Volume parity: after a candle with volume above the threshold, the
//!    first later close within `volume_touch_pct` of its close (inside the
//!    return window) votes if that candle is bullish.

use tracing::debug;

use crate::domain::{Candle, Signal};
use crate::indicators::sma::{rolling_max, rolling_min};

use super::{mark, Detector, DetectorError, DetectorOutput};

pub const FIB_RATIO: f64 = 0.618;
const VOLUME_QUANTILE: f64 = 0.90;

#[derive(Debug, Clone)]
pub struct FibonacciConfluenceDetector {
    pub trend_period: usize,
    /// Fixed high-volume threshold; the 90th percentile of the series when `None`.
    pub volume_threshold: Option<f64>,
    pub volume_return_window: usize,
    pub volume_touch_pct: f64,
    pub fib_touch_pct: f64,
    /// Tail length scanned by the structure and volume checks; `None` scans all.
    pub scan_limit: Option<usize>,
}

impl FibonacciConfluenceDetector {
    pub fn new(
        trend_period: usize,
        volume_threshold: Option<f64>,
        volume_return_window: usize,
        volume_touch_pct: f64,
        fib_touch_pct: f64,
        scan_limit: Option<usize>,
    ) -> Self {
        assert!(trend_period >= 1, "trend_period must be >= 1");
        assert!(volume_return_window >= 2, "volume_return_window must be >= 2");
        assert!(volume_touch_pct >= 0.0, "volume_touch_pct must be >= 0");
        assert!(fib_touch_pct >= 0.0, "fib_touch_pct must be >= 0");
        Self {
            trend_period,
            volume_threshold,
            volume_return_window,
            volume_touch_pct,
            fib_touch_pct,
            scan_limit,
        }
    }

    pub fn default_params() -> Self {
        Self::new(10, None, 20, 0.002, 0.002, Some(100))
    }

    fn tail_start(&self, n: usize, min_len: usize) -> usize {
        self.scan_limit
            .map_or(0, |limit| n.saturating_sub(limit.max(min_len)))
    }

    fn structure_check(&self, candles: &[Candle], signals: &mut [Signal]) {
        let start = self.tail_start(candles.len(), 3);
        for k in (start + 2)..candles.len() {
            let high = candles[k - 2].high;
            let low = candles[k - 1].low;
            if !(high > low) {
                continue;
            }
            let level = low + (high - low) * FIB_RATIO;
            let close = candles[k].close;
            if (close - level).abs() <= self.fib_touch_pct * close && candles[k].is_bullish() {
                mark(signals, k, Signal::Bullish);
            }
        }
    }

    /// Rolling 61.8% level, NaN during warmup.
    pub fn trend_levels(&self, candles: &[Candle]) -> Vec<f64> {
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        rolling_max(&highs, self.trend_period)
            .into_iter()
            .zip(rolling_min(&lows, self.trend_period))
            .map(|(hh, ll)| ll + (hh - ll) * FIB_RATIO)
            .collect()
    }

    fn trend_check(&self, candles: &[Candle], levels: &[f64], signals: &mut [Signal]) {
        for i in 1..candles.len() {
            let level = levels[i];
            if !(level.is_finite() && level > 0.0) {
                continue;
            }
            let prev = candles[i - 1].close;
            let close = candles[i].close;
            let crossed = (prev <= level && level <= close) || (close <= level && level <= prev);
            if crossed && candles[i].is_bullish() {
                mark(signals, i, Signal::Bullish);
            }
        }
    }

    fn volume_check(&self, candles: &[Candle], signals: &mut [Signal]) {
        let threshold = match self.volume_threshold {
            Some(t) => t,
            None => {
                let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
                match quantile(&volumes, VOLUME_QUANTILE) {
                    Some(q) => q,
                    None => return,
                }
            }
        };
        debug!(threshold, "volume parity threshold");

        let n = candles.len();
        let start = self.tail_start(n, self.volume_return_window);
        for i in start..n {
            if !(candles[i].volume > threshold) {
                continue;
            }
            let reference = candles[i].close;
            let touch = self.volume_touch_pct * reference;
            let end = (i + self.volume_return_window).min(n);
            if let Some(j) = (i + 1..end).find(|&j| (candles[j].close - reference).abs() <= touch) {
                if candles[j].is_bullish() {
                    mark(signals, j, Signal::Bullish);
                }
            }
        }
    }
}

/// Linear-interpolation quantile of the finite values, `None` if there are none.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

impl Detector for FibonacciConfluenceDetector {
    fn name(&self) -> &str {
        "fibonacci"
    }

    fn warmup_candles(&self) -> usize {
        2
    }

    fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError> {
        let n = candles.len();
        if n < self.warmup_candles() {
            return Ok(DetectorOutput::neutral(n));
        }

        let mut signals = vec![Signal::Neutral; n];
        let levels = self.trend_levels(candles);
        self.structure_check(candles, &mut signals);
        self.trend_check(candles, &levels, &mut signals);
        self.volume_check(candles, &mut signals);

        Ok(DetectorOutput {
            signals,
            ..DetectorOutput::default()
        }
        .with_level("fib_trend_level", levels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::test_support::{ohlc, ohlcv};

    fn detector() -> FibonacciConfluenceDetector {
        FibonacciConfluenceDetector::new(10, Some(1_000_000.0), 20, 0.002, 0.002, None)
    }

    #[test]
    fn quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((quantile(&v, 0.9).unwrap() - 4.6).abs() < 1e-12);
        assert_eq!(quantile(&v, 0.0), Some(1.0));
        assert_eq!(quantile(&[], 0.9), None);
    }

    #[test]
    fn structure_pattern_votes_on_third_candle() {
        // high[0] = 1.10, low[1] = 1.00 -> 61.8% level 1.0618
        let candles = ohlc(&[
            (1.08, 1.10, 1.07, 1.09),
            (1.09, 1.09, 1.00, 1.01),
            (1.02, 1.07, 1.015, 1.0615),
        ]);
        let out = detector().analyze(&candles).unwrap();
        assert_eq!(out.signals[2], Signal::Bullish);
    }

    #[test]
    fn structure_pattern_needs_bullish_body() {
        let candles = ohlc(&[
            (1.08, 1.10, 1.07, 1.09),
            (1.09, 1.09, 1.00, 1.01),
            (1.065, 1.07, 1.05, 1.0615),
        ]);
        let out = detector().analyze(&candles).unwrap();
        assert_eq!(out.signals[2], Signal::Neutral);
    }

    #[test]
    fn trend_level_cross_votes() {
        let det = FibonacciConfluenceDetector::new(3, Some(1_000_000.0), 20, 0.002, 0.0, None);
        let candles = ohlc(&[
            (1.00, 1.00, 0.90, 0.95),
            (0.95, 1.00, 0.90, 0.92),
            (0.92, 0.98, 0.90, 0.91),
            (0.91, 1.00, 0.90, 0.99), // crosses 0.9618 upward
        ]);
        let out = det.analyze(&candles).unwrap();
        let level = out.levels["fib_trend_level"][3];
        assert!((level - 0.9618).abs() < 1e-12);
        assert_eq!(out.signals[3], Signal::Bullish);
        assert!(out.levels["fib_trend_level"][1].is_nan());
    }

    #[test]
    fn volume_return_votes_once() {
        let det = FibonacciConfluenceDetector::new(50, Some(5_000.0), 20, 0.002, 0.0, None);
        let candles = ohlcv(&[
            (1.00, 1.01, 0.99, 1.00, 1000.0),
            (1.00, 1.05, 1.00, 1.04, 9000.0), // high volume, reference 1.04
            (1.04, 1.08, 1.04, 1.07, 1000.0),
            (1.07, 1.07, 1.03, 1.039, 1000.0), // bearish return: consumes the check
            (1.03, 1.045, 1.03, 1.041, 1000.0),
        ]);
        let out = det.analyze(&candles).unwrap();
        assert_eq!(out.active_count(), 0);

        let candles = ohlcv(&[
            (1.00, 1.01, 0.99, 1.00, 1000.0),
            (1.00, 1.05, 1.00, 1.04, 9000.0),
            (1.04, 1.08, 1.04, 1.07, 1000.0),
            (1.03, 1.045, 1.03, 1.041, 1000.0), // bullish return within 0.2%
        ]);
        let out = det.analyze(&candles).unwrap();
        assert_eq!(out.signals[3], Signal::Bullish);
        assert_eq!(out.active_count(), 1);
    }

    #[test]
    fn dynamic_volume_threshold() {
        let mut data: Vec<_> = (0..10)
            .map(|_| (1.00, 1.01, 0.99, 1.00, 1000.0))
            .collect();
        data[2] = (1.00, 1.05, 1.00, 1.04, 50_000.0);
        data[4] = (1.03, 1.045, 1.03, 1.041, 1000.0);
        let det = FibonacciConfluenceDetector::new(50, None, 20, 0.002, 0.0, None);
        let out = det.analyze(&ohlcv(&data)).unwrap();
        assert_eq!(out.signals[4], Signal::Bullish);
    }
}
