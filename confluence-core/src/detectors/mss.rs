//! Market structure shift: liquidity sweep followed by a break of the
//! opposing side of the swept range.
//!
//! For each candle `i` with a full `lookback` window `[i - lookback, i)`:
//! - low[i] below the window's lowest low is a downside sweep; the first later
//!   candle whose high clears the window's highest high votes +1.
//! - high[i] above the window's highest high is an upside sweep; the first
//!   later candle whose low breaks the window's lowest low votes -1.
//!
//! Only the last `scan_limit` candles are scanned.

use crate::domain::{Candle, Signal};

use super::{mark, Detector, DetectorError, DetectorOutput};

#[derive(Debug, Clone)]
pub struct MarketStructureShiftDetector {
    pub lookback: usize,
    pub scan_limit: usize,
}

impl MarketStructureShiftDetector {
    pub fn new(lookback: usize, scan_limit: usize) -> Self {
        assert!(lookback >= 1, "lookback must be >= 1");
        assert!(scan_limit > lookback, "scan_limit must exceed lookback");
        Self {
            lookback,
            scan_limit,
        }
    }

    pub fn default_params() -> Self {
        Self::new(20, 200)
    }
}

impl Detector for MarketStructureShiftDetector {
    fn name(&self) -> &str {
        "mss"
    }

    fn warmup_candles(&self) -> usize {
        self.lookback + 2
    }

    fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError> {
        let n = candles.len();
        if n < self.warmup_candles() {
            return Ok(DetectorOutput::neutral(n));
        }
        let mut signals = vec![Signal::Neutral; n];

        let offset = n.saturating_sub(self.scan_limit);
        let recent = &candles[offset..];

        for i in self.lookback + 1..recent.len() {
            let window = &recent[i - self.lookback..i];
            let window_low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
            let window_high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
            let later = recent.iter().enumerate().skip(i + 1);

            if recent[i].low < window_low {
                if let Some((j, _)) = later.clone().find(|(_, c)| c.high > window_high) {
                    mark(&mut signals, offset + j, Signal::Bullish);
                }
            }
            if recent[i].high > window_high {
                if let Some((j, _)) = later.clone().find(|(_, c)| c.low < window_low) {
                    mark(&mut signals, offset + j, Signal::Bearish);
                }
            }
        }

        Ok(DetectorOutput {
            signals,
            ..DetectorOutput::default()
        })
    }
}
