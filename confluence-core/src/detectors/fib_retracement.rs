//! Fibonacci retracement bounce over a rolling swing window.
//!
//! For each candle the window is the `lookback_period` candles ending at it.
//! The window trends up when its highest high comes after its lowest low.
//! In an uptrend a key level is `high - range * ratio`, and a candle whose low
//! lands in `[level, level * (1 + touch)]` and closes above it votes +1. In a
//! downtrend the level is `low + range * ratio`, and a candle whose high lands
//! in `[level * (1 - touch), level]` and closes below it votes -1.

use crate::domain::{Candle, Signal};

use super::{Detector, DetectorError, DetectorOutput};

#[derive(Debug, Clone)]
pub struct FibonacciRetracementDetector {
    pub lookback_period: usize,
    pub key_ratios: Vec<f64>,
    pub touch_proximity_pct: f64,
}

impl FibonacciRetracementDetector {
    pub fn new(lookback_period: usize, key_ratios: Vec<f64>, touch_proximity_pct: f64) -> Self {
        assert!(lookback_period >= 2, "lookback_period must be >= 2");
        assert!(
            key_ratios.iter().all(|r| (0.0..=1.0).contains(r)),
            "key ratios must be within [0, 1]"
        );
        assert!(touch_proximity_pct >= 0.0, "touch_proximity_pct must be >= 0");
        Self {
            lookback_period,
            key_ratios,
            touch_proximity_pct,
        }
    }

    pub fn default_params() -> Self {
        Self::new(150, vec![0.5, 0.618], 0.001)
    }

    fn vote(&self, window: &[Candle]) -> Signal {
        let Some(candle) = window.last() else {
            return Signal::Neutral;
        };
        // first occurrence of each extreme
        let (mut hi_idx, mut lo_idx) = (0, 0);
        for (i, c) in window.iter().enumerate() {
            if c.high > window[hi_idx].high {
                hi_idx = i;
            }
            if c.low < window[lo_idx].low {
                lo_idx = i;
            }
        }
        let high = window[hi_idx].high;
        let low = window[lo_idx].low;
        let range = high - low;
        if !(range > 0.0) {
            return Signal::Neutral;
        }

        let touch = self.touch_proximity_pct;
        let mut signal = Signal::Neutral;
        for &ratio in &self.key_ratios {
            if hi_idx > lo_idx {
                let level = high - range * ratio;
                if level <= candle.low && candle.low <= level * (1.0 + touch) && candle.close > level {
                    signal = Signal::Bullish;
                }
            } else {
                let level = low + range * ratio;
                if level * (1.0 - touch) <= candle.high && candle.high <= level && candle.close < level {
                    signal = Signal::Bearish;
                }
            }
        }
        signal
    }
}

impl Detector for FibonacciRetracementDetector {
    fn name(&self) -> &str {
        "fib_retracement"
    }

    fn warmup_candles(&self) -> usize {
        2
    }

    fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError> {
        let n = candles.len();
        if n < self.warmup_candles() {
            return Ok(DetectorOutput::neutral(n));
        }
        let signals = (0..n)
            .map(|i| {
                let start = (i + 1).saturating_sub(self.lookback_period);
                self.vote(&candles[start..=i])
            })
            .collect();
        Ok(DetectorOutput {
            signals,
            ..DetectorOutput::default()
        })
    }
}
