//! Pattern detectors: independent structural-pattern classifiers.
//!
//! Every detector reads candle history and emits one categorical vote per
//! candle plus optional zone and level side-columns. Detectors never see
//! portfolio state or each other's output; the pipeline owns their results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Candle, Signal, Zone};

pub mod factory;
pub mod fib_retracement;
pub mod fibonacci;
pub mod fvg;
pub mod mss;
pub mod order_block;
pub mod sma_crossover;
pub mod structure_break;
pub mod support_resistance;

pub use factory::{
    create_detector, default_detector_configs, DetectorConfig, FactoryError, DETECTOR_KINDS,
    OPTIONAL_DETECTOR_KINDS,
};
pub use fib_retracement::FibonacciRetracementDetector;
pub use fibonacci::FibonacciConfluenceDetector;
pub use fvg::FairValueGapDetector;
pub use mss::MarketStructureShiftDetector;
pub use order_block::OrderBlockDetector;
pub use sma_crossover::SmaCrossoverDetector;
pub use structure_break::{StructureBreakDetector, StructureEvent, StructureKind};
pub use support_resistance::SupportResistanceDetector;

// ─── Error type ──────────────────────────────────────────────────────

/// Failures a detector may report instead of an output.
#[derive(Debug, Error, PartialEq)]
pub enum DetectorError {
    #[error("index {index} is outside a series of {len} candles")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("detector produced {actual} signals for {expected} candles")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("{0}")]
    Failed(String),
}

// ─── Output ──────────────────────────────────────────────────────────

/// Everything one detector contributes to an analysis frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutput {
    /// One vote per input candle.
    pub signals: Vec<Signal>,
    /// Named zone lists (e.g. `support_zones`).
    pub zones: BTreeMap<String, Vec<Zone>>,
    /// Named per-candle running references, NaN where unknown.
    pub levels: BTreeMap<String, Vec<f64>>,
}

impl DetectorOutput {
    /// All-neutral output with no side-columns.
    pub fn neutral(len: usize) -> Self {
        Self {
            signals: vec![Signal::Neutral; len],
            ..Self::default()
        }
    }

    pub fn with_zones(mut self, key: &str, zones: Vec<Zone>) -> Self {
        self.zones.insert(key.to_string(), zones);
        self
    }

    pub fn with_level(mut self, key: &str, values: Vec<f64>) -> Self {
        self.levels.insert(key.to_string(), values);
        self
    }

    /// Number of non-neutral votes.
    pub fn active_count(&self) -> usize {
        self.signals.iter().filter(|s| !s.is_neutral()).count()
    }
}

// ─── Trait ───────────────────────────────────────────────────────────

/// Trait for pattern detectors.
///
/// # Determinism
/// `analyze` is a pure function of its input: the same candles always
/// produce the same output.
///
/// # Look-ahead
/// `analyze` labels the whole slice retrospectively and may use candles after
/// a given index to decide that index's vote. `signal_at` must use only
/// `candles[..=index]`.
pub trait Detector: Send + Sync {
    /// Registry key; also the name of the signal column.
    fn name(&self) -> &str;

    /// Fewer candles than this produce an all-neutral output.
    fn warmup_candles(&self) -> usize;

    /// Label every candle of `candles`.
    fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError>;

    /// Vote for `candles[index]` derived from the prefix ending at `index`.
    fn signal_at(&self, candles: &[Candle], index: usize) -> Result<Signal, DetectorError> {
        if index >= candles.len() {
            return Err(DetectorError::IndexOutOfRange {
                index,
                len: candles.len(),
            });
        }
        let prefix = &candles[..=index];
        if prefix.len() < self.warmup_candles() {
            return Ok(Signal::Neutral);
        }
        let output = self.analyze(prefix)?;
        Ok(output.signals.last().copied().unwrap_or_default())
    }
}

/// Write `value` into `signals[index]` if the index exists.
pub(crate) fn mark(signals: &mut [Signal], index: usize, value: Signal) {
    if let Some(slot) = signals.get_mut(index) {
        *slot = value;
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_candles;

    struct LastCandleBullish;

    impl Detector for LastCandleBullish {
        fn name(&self) -> &str {
            "last_bullish"
        }

        fn warmup_candles(&self) -> usize {
            2
        }

        fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError> {
            let signals = candles
                .iter()
                .map(|c| if c.is_bullish() { Signal::Bullish } else { Signal::Neutral })
                .collect();
            Ok(DetectorOutput {
                signals,
                ..DetectorOutput::default()
            })
        }
    }

    #[test]
    fn default_signal_at_uses_prefix() {
        let candles = make_candles(&[10.0, 11.0, 10.5]);
        let d = LastCandleBullish;
        assert_eq!(d.signal_at(&candles, 0).unwrap(), Signal::Neutral); // warmup
        assert_eq!(d.signal_at(&candles, 1).unwrap(), Signal::Bullish);
        assert_eq!(d.signal_at(&candles, 2).unwrap(), Signal::Neutral);
        assert!(matches!(
            d.signal_at(&candles, 3),
            Err(DetectorError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn neutral_output_shape() {
        let out = DetectorOutput::neutral(4).with_level("x", vec![f64::NAN; 4]);
        assert_eq!(out.signals.len(), 4);
        assert_eq!(out.active_count(), 0);
        assert!(out.levels.contains_key("x"));
    }
}
