//! SMA crossover: votes on the candle where the fast mean crosses the slow.
//!
//! The fast side above the slow side is the bullish state. A vote fires only
//! on a state change between two candles where both means are defined, so
//! the warm-up never produces a spurious cross.

use std::cmp::Ordering;

use crate::domain::{Candle, Signal};
use crate::indicators::sma::sma_of_series;

use super::{Detector, DetectorError, DetectorOutput};

#[derive(Debug, Clone)]
pub struct SmaCrossoverDetector {
    pub short_window: usize,
    pub long_window: usize,
}

impl SmaCrossoverDetector {
    pub fn new(short_window: usize, long_window: usize) -> Self {
        assert!(short_window >= 1, "short_window must be >= 1");
        assert!(
            long_window > short_window,
            "long_window must be greater than short_window"
        );
        Self {
            short_window,
            long_window,
        }
    }

    pub fn default_params() -> Self {
        Self::new(20, 50)
    }
}

fn state(short: f64, long: f64) -> Option<Signal> {
    match short.partial_cmp(&long)? {
        Ordering::Greater => Some(Signal::Bullish),
        _ => Some(Signal::Bearish),
    }
}

impl Detector for SmaCrossoverDetector {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn warmup_candles(&self) -> usize {
        self.long_window + 1
    }

    fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError> {
        let n = candles.len();
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let short = sma_of_series(&closes, self.short_window);
        let long = sma_of_series(&closes, self.long_window);

        let mut signals = vec![Signal::Neutral; n];
        for i in 1..n {
            let (Some(prev), Some(now)) = (state(short[i - 1], long[i - 1]), state(short[i], long[i]))
            else {
                continue;
            };
            if prev != now {
                signals[i] = now;
            }
        }

        Ok(DetectorOutput {
            signals,
            ..DetectorOutput::default()
        }
        .with_level("sma_short", short)
        .with_level("sma_long", long))
    }
}
