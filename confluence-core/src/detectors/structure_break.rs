//! Break of structure (BOS), change of character (CHOCH) and order-block
//! retests.
//!
//! A two-state trend machine (starting in an uptrend) walks the candles,
//! comparing each close against the last known swing high and swing low:
//!
//! | trend | break above swing high    | break below swing low     |
//! |-------|---------------------------|---------------------------|
//! | up    | BOS bullish (OB at low)   | CHOCH bearish, flip down  |
//! | down  | CHOCH bullish, flip up    | BOS bearish (OB at high)  |
//!
//! Each BOS records a candidate order-block level. The first later candle
//! within `ob_return_lookback` that returns within `level_touch_threshold_pct`
//! of that level with a confirming body emits the vote.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Candle, LevelKind, Signal};
use crate::levels::{forward_fill, swing_points};

use super::{mark, Detector, DetectorError, DetectorOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    BosBullish,
    BosBearish,
    ChochBullish,
    ChochBearish,
}

/// One structural break.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureEvent {
    pub index: usize,
    pub kind: StructureKind,
    /// The swing level that was broken.
    pub level: f64,
    /// Candidate order-block level recorded by a BOS.
    pub order_block: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct StructureBreakDetector {
    pub swing_detection_period: usize,
    /// Breaks need a close through the level; otherwise a wick suffices.
    pub use_close_only_for_break: bool,
    pub level_touch_threshold_pct: f64,
    pub ob_return_lookback: usize,
    pub bos_choch_momentum_confirmation: bool,
    pub ob_return_momentum_confirmation: bool,
}

struct StructureScan {
    events: Vec<StructureEvent>,
    last_swing_high: Vec<f64>,
    last_swing_low: Vec<f64>,
    trend: Vec<f64>,
}

impl StructureBreakDetector {
    pub fn new(
        swing_detection_period: usize,
        use_close_only_for_break: bool,
        level_touch_threshold_pct: f64,
        ob_return_lookback: usize,
    ) -> Self {
        assert!(swing_detection_period >= 1, "swing_detection_period must be >= 1");
        assert!(level_touch_threshold_pct >= 0.0, "level_touch_threshold_pct must be >= 0");
        assert!(ob_return_lookback >= 2, "ob_return_lookback must be >= 2");
        Self {
            swing_detection_period,
            use_close_only_for_break,
            level_touch_threshold_pct,
            ob_return_lookback,
            bos_choch_momentum_confirmation: true,
            ob_return_momentum_confirmation: true,
        }
    }

    pub fn default_params() -> Self {
        Self::new(5, true, 0.001, 20)
    }

    pub fn with_momentum_confirmation(mut self, on_break: bool, on_return: bool) -> Self {
        self.bos_choch_momentum_confirmation = on_break;
        self.ob_return_momentum_confirmation = on_return;
        self
    }

    /// BOS/CHOCH events in index order.
    pub fn structure_events(&self, candles: &[Candle]) -> Vec<StructureEvent> {
        self.scan(candles).events
    }

    fn breaks_up(&self, candles: &[Candle], i: usize, level: f64) -> bool {
        if self.use_close_only_for_break {
            candles[i - 1].close <= level && level < candles[i].close
        } else {
            candles[i].high > level
        }
    }

    fn breaks_down(&self, candles: &[Candle], i: usize, level: f64) -> bool {
        if self.use_close_only_for_break {
            candles[i - 1].close >= level && level > candles[i].close
        } else {
            candles[i].low < level
        }
    }

    fn scan(&self, candles: &[Candle]) -> StructureScan {
        let n = candles.len();
        let swings = swing_points(candles, self.swing_detection_period);
        let last_swing_high = forward_fill(&swings, LevelKind::SwingHigh, n);
        let last_swing_low = forward_fill(&swings, LevelKind::SwingLow, n);

        let mut events = Vec::new();
        let mut trend = vec![1.0; n];
        let mut uptrend = true;

        for i in 1..n {
            let candle = &candles[i];
            let high = last_swing_high[i];
            let low = last_swing_low[i];
            let (bull_ok, bear_ok) = if self.bos_choch_momentum_confirmation {
                (candle.is_bullish(), candle.is_bearish())
            } else {
                (true, true)
            };

            if uptrend {
                if bull_ok && self.breaks_up(candles, i, high) {
                    events.push(StructureEvent {
                        index: i,
                        kind: StructureKind::BosBullish,
                        level: high,
                        order_block: low.is_finite().then_some(low),
                    });
                }
                if bear_ok && self.breaks_down(candles, i, low) {
                    events.push(StructureEvent {
                        index: i,
                        kind: StructureKind::ChochBearish,
                        level: low,
                        order_block: None,
                    });
                    uptrend = false;
                }
            } else {
                if bear_ok && self.breaks_down(candles, i, low) {
                    events.push(StructureEvent {
                        index: i,
                        kind: StructureKind::BosBearish,
                        level: low,
                        order_block: high.is_finite().then_some(high),
                    });
                }
                if bull_ok && self.breaks_up(candles, i, high) {
                    events.push(StructureEvent {
                        index: i,
                        kind: StructureKind::ChochBullish,
                        level: high,
                        order_block: None,
                    });
                    uptrend = true;
                }
            }
            trend[i] = if uptrend { 1.0 } else { -1.0 };
        }

        StructureScan {
            events,
            last_swing_high,
            last_swing_low,
            trend,
        }
    }

    /// First candle after `event` that retests its order-block level.
    fn retest(&self, candles: &[Candle], event: &StructureEvent, level: f64) -> Option<(usize, Signal)> {
        let threshold = self.level_touch_threshold_pct * level;
        let end = (event.index + self.ob_return_lookback).min(candles.len());
        let confirm = self.ob_return_momentum_confirmation;

        (event.index + 1..end).find_map(|j| {
            let c = &candles[j];
            match event.kind {
                StructureKind::BosBullish
                    if (c.low - level).abs() <= threshold && (!confirm || c.is_bullish()) =>
                {
                    Some((j, Signal::Bullish))
                }
                StructureKind::BosBearish
                    if (c.high - level).abs() <= threshold && (!confirm || c.is_bearish()) =>
                {
                    Some((j, Signal::Bearish))
                }
                _ => None,
            }
        })
    }
}

impl Detector for StructureBreakDetector {
    fn name(&self) -> &str {
        "bos_choch_ob"
    }

    fn warmup_candles(&self) -> usize {
        2 * self.swing_detection_period + 2
    }

    fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError> {
        let n = candles.len();
        if n < self.warmup_candles() {
            return Ok(DetectorOutput::neutral(n));
        }

        let scan = self.scan(candles);
        debug!(events = scan.events.len(), "structure breaks identified");

        let mut signals = vec![Signal::Neutral; n];
        for event in &scan.events {
            let Some(level) = event.order_block else { continue };
            if let Some((j, signal)) = self.retest(candles, event, level) {
                mark(&mut signals, j, signal);
            }
        }

        Ok(DetectorOutput {
            signals,
            ..DetectorOutput::default()
        }
        .with_level("last_swing_high", scan.last_swing_high)
        .with_level("last_swing_low", scan.last_swing_low)
        .with_level("structure_trend", scan.trend))
    }
}
