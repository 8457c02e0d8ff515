//! Order blocks: the last opposite-coloured candle before an impulsive move.
//!
//! Blocks are found once over the last `lookback` candles and reused for the
//! whole series. A candle votes when its predecessor traded into a block and
//! closed in the block's direction.

use tracing::debug;

use crate::domain::{Bias, Candle, OrderBlock, Signal};

use super::{mark, Detector, DetectorError, DetectorOutput};

#[derive(Debug, Clone)]
pub struct OrderBlockDetector {
    pub lookback: usize,
    pub breakout_candles: usize,
}

impl OrderBlockDetector {
    pub fn new(lookback: usize, breakout_candles: usize) -> Self {
        assert!(lookback >= 2, "lookback must be >= 2");
        assert!(breakout_candles >= 1, "breakout_candles must be >= 1");
        Self {
            lookback,
            breakout_candles,
        }
    }

    pub fn default_params() -> Self {
        Self::new(75, 3)
    }

    /// Order blocks in the tail window, in formation order.
    ///
    /// Bullish: a bearish candle followed by `breakout_candles` bullish candles
    /// whose highest high exceeds its high. Bearish: a bullish candle followed
    /// by `breakout_candles` bearish candles whose lowest low undercuts its low.
    pub fn find_blocks(&self, candles: &[Candle]) -> Vec<OrderBlock> {
        let offset = candles.len().saturating_sub(self.lookback);
        let window = &candles[offset..];
        let k = self.breakout_candles;
        let mut blocks = Vec::new();
        if window.len() <= k {
            return blocks;
        }

        for i in 0..window.len() - k {
            let candle = &window[i];
            let impulse = &window[i + 1..=i + k];

            if candle.is_bearish()
                && impulse.iter().all(Candle::is_bullish)
                && impulse.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max) > candle.high
            {
                blocks.push(OrderBlock {
                    lower: candle.low,
                    upper: candle.high,
                    bias: Bias::Bullish,
                    formed_at: offset + i,
                });
            }
            if candle.is_bullish()
                && impulse.iter().all(Candle::is_bearish)
                && impulse.iter().map(|c| c.low).fold(f64::INFINITY, f64::min) < candle.low
            {
                blocks.push(OrderBlock {
                    lower: candle.low,
                    upper: candle.high,
                    bias: Bias::Bearish,
                    formed_at: offset + i,
                });
            }
        }
        blocks
    }
}

impl Detector for OrderBlockDetector {
    fn name(&self) -> &str {
        "order_block"
    }

    fn warmup_candles(&self) -> usize {
        self.breakout_candles + 2
    }

    fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError> {
        let n = candles.len();
        if n < self.warmup_candles() {
            return Ok(DetectorOutput::neutral(n));
        }

        let blocks = self.find_blocks(candles);
        debug!(blocks = blocks.len(), "order blocks identified");

        let mut signals = vec![Signal::Neutral; n];
        for i in 1..n {
            let prev = &candles[i - 1];
            for block in &blocks {
                if !prev.overlaps(block.lower, block.upper) {
                    continue;
                }
                match block.bias {
                    Bias::Bullish if prev.is_bullish() => mark(&mut signals, i, Signal::Bullish),
                    Bias::Bearish if prev.is_bearish() => mark(&mut signals, i, Signal::Bearish),
                    _ => {}
                }
            }
        }

        let zones = blocks.iter().map(OrderBlock::zone).collect();
        Ok(DetectorOutput {
            signals,
            ..DetectorOutput::default()
        }
        .with_zones("ob_zones", zones))
    }
}
