//! Higher-timeframe trend filter.
//!
//! A candle is in an uptrend when its close is above the moving average,
//! otherwise in a downtrend. Candles inside the average's warmup are
//! `Undefined`, which the scorer treats as "no penalty".
//!
//! Alignment only exposes higher-timeframe bars that have closed. A bar
//! stamped at its close is known from its own timestamp; a bar stamped at its
//! open is known from the next bar's timestamp, and the last bar from its
//! timestamp plus the preceding bar spacing.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::Candle;
use crate::indicators::ema::ema_of_series;
use crate::indicators::sma::sma_of_series;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendState {
    Up,
    Down,
    #[default]
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaKind {
    #[default]
    Ema,
    Sma,
}

/// Which end of its interval a higher-timeframe timestamp marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarStamp {
    #[default]
    Close,
    Open,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendFilterConfig {
    pub period: usize,
    pub ma: MaKind,
    pub stamp: BarStamp,
}

impl Default for TrendFilterConfig {
    fn default() -> Self {
        Self {
            period: 50,
            ma: MaKind::Ema,
            stamp: BarStamp::Close,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrendFilter {
    period: usize,
    ma: MaKind,
    stamp: BarStamp,
}

impl TrendFilter {
    pub fn new(period: usize, ma: MaKind) -> Self {
        assert!(period >= 1, "trend period must be >= 1");
        Self {
            period,
            ma,
            stamp: BarStamp::Close,
        }
    }

    pub fn with_stamp(mut self, stamp: BarStamp) -> Self {
        self.stamp = stamp;
        self
    }

    pub fn from_config(config: &TrendFilterConfig) -> Self {
        Self::new(config.period, config.ma).with_stamp(config.stamp)
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn moving_average(&self, candles: &[Candle]) -> Vec<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        match self.ma {
            MaKind::Ema => ema_of_series(&closes, self.period),
            MaKind::Sma => sma_of_series(&closes, self.period),
        }
    }

    /// Trend state of every candle.
    pub fn classify(&self, candles: &[Candle]) -> Vec<TrendState> {
        candles
            .iter()
            .zip(self.moving_average(candles))
            .map(|(c, ma)| {
                if ma.is_nan() || c.close.is_nan() {
                    TrendState::Undefined
                } else if c.close > ma {
                    TrendState::Up
                } else {
                    TrendState::Down
                }
            })
            .collect()
    }

    /// Trend state of the last candle.
    pub fn latest(&self, candles: &[Candle]) -> TrendState {
        self.classify(candles).last().copied().unwrap_or_default()
    }

    /// Map each `lower` candle to the state of the latest `higher` candle
    /// that closed at or before its timestamp.
    ///
    /// Both slices must be in ascending timestamp order.
    pub fn align(&self, higher: &[Candle], lower: &[Candle]) -> Vec<TrendState> {
        let states = self.classify(higher);
        let closed_at = self.close_times(higher);
        let mut aligned = Vec::with_capacity(lower.len());
        let mut cursor = 0;
        let mut current = TrendState::Undefined;
        for candle in lower {
            while cursor < closed_at.len() && closed_at[cursor].is_some_and(|t| t <= candle.timestamp) {
                current = states[cursor];
                cursor += 1;
            }
            aligned.push(current);
        }
        aligned
    }

    /// Close time of each higher bar; `None` when it cannot be known.
    fn close_times(&self, higher: &[Candle]) -> Vec<Option<NaiveDateTime>> {
        match self.stamp {
            BarStamp::Close => higher.iter().map(|c| Some(c.timestamp)).collect(),
            BarStamp::Open => (0..higher.len())
                .map(|i| match (i.checked_sub(1), higher.get(i + 1)) {
                    (_, Some(next)) => Some(next.timestamp),
                    (Some(prev), None) => {
                        let spacing = higher[i].timestamp - higher[prev].timestamp;
                        Some(higher[i].timestamp + spacing)
                    }
                    (None, None) => None,
                })
                .collect(),
        }
    }
}

impl Default for TrendFilter {
    fn default() -> Self {
        Self::from_config(&TrendFilterConfig::default())
    }
}
