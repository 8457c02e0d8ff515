//! Price intervals and levels produced by the detectors.

use serde::{Deserialize, Serialize};

/// Which side of price a zone supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Support,
    Resistance,
}

/// A `[lower, upper]` price interval. Invariant: `lower <= upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub lower: f64,
    pub upper: f64,
    pub kind: ZoneKind,
}

impl Zone {
    pub fn new(a: f64, b: f64, kind: ZoneKind) -> Self {
        let (lower, upper) = if a <= b { (a, b) } else { (b, a) };
        Self { lower, upper, kind }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.lower && price <= self.upper
    }

    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    pub fn as_tuple(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }
}

/// Type of an extremal price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelKind {
    SwingHigh,
    SwingLow,
}

/// A single extremal price detected at a specific candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub index: usize,
    pub price: f64,
    pub kind: LevelKind,
}

/// Bias of an order block or fair-value gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Bullish,
    Bearish,
}

impl Bias {
    /// Bullish structures act as support, bearish ones as resistance.
    pub fn zone_kind(self) -> ZoneKind {
        match self {
            Bias::Bullish => ZoneKind::Support,
            Bias::Bearish => ZoneKind::Resistance,
        }
    }
}

/// Last opposite-coloured candle before an impulsive breakout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderBlock {
    pub lower: f64,
    pub upper: f64,
    pub bias: Bias,
    /// Index of the candle whose range forms the block.
    pub formed_at: usize,
}

impl OrderBlock {
    pub fn zone(&self) -> Zone {
        Zone::new(self.lower, self.upper, self.bias.zone_kind())
    }
}

/// Three-candle price void.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub lower: f64,
    pub upper: f64,
    pub bias: Bias,
    /// Index of the middle candle of the pattern.
    pub formed_at: usize,
    /// Index of the candle that completes the pattern (`formed_at + 1`).
    pub confirmed_at: usize,
    /// Index of the candle that returned into the gap, if any.
    pub mitigated_at: Option<usize>,
    /// Index after which the gap aged out without mitigation, if any.
    pub expired_at: Option<usize>,
}

impl FairValueGap {
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// Still eligible to emit a signal at `index`.
    pub fn is_active_at(&self, index: usize) -> bool {
        index > self.confirmed_at
            && self.mitigated_at.map_or(true, |m| index <= m)
            && self.expired_at.map_or(true, |e| index <= e)
    }

    /// Neither mitigated nor expired by the end of the analysed series.
    pub fn is_open(&self) -> bool {
        self.mitigated_at.is_none() && self.expired_at.is_none()
    }

    pub fn zone(&self) -> Zone {
        Zone::new(self.lower, self.upper, self.bias.zone_kind())
    }
}
