//! Trade direction and the risk-managed plan handed to outer collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Final directional decision of the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Buy,
    Sell,
    #[default]
    #[serde(rename = "NONE")]
    Flat,
}

impl Direction {
    pub fn is_flat(self) -> bool {
        self == Direction::Flat
    }

    /// +1 for buy, -1 for sell, 0 for flat.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Buy => 1.0,
            Direction::Sell => -1.0,
            Direction::Flat => 0.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
            Direction::Flat => "NONE",
        };
        f.write_str(s)
    }
}

/// Entry, protective stop, target and size for one directional decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub pair: String,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// `None` when no account-risk settings were supplied.
    pub position_size: Option<f64>,
    pub trailing_stop_activation_price: f64,
    pub atr: f64,
    pub risk_reward_ratio: f64,
    pub reason: String,
}

impl TradePlan {
    /// Distance between entry and stop.
    pub fn risk_per_unit(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }
}

impl fmt::Display for TradePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.direction, self.pair)?;
        writeln!(f, "Reason: {}", self.reason)?;
        writeln!(f, "Entry: {:.5}", self.entry_price)?;
        writeln!(f, "Stop loss: {:.5}", self.stop_loss)?;
        writeln!(f, "Take profit: {:.5}", self.take_profit)?;
        writeln!(
            f,
            "Trailing stop activates at: {:.5}",
            self.trailing_stop_activation_price
        )?;
        if let Some(size) = self.position_size {
            writeln!(f, "Position size: {size:.2}")?;
        }
        write!(f, "Risk/reward: 1:{}", self.risk_reward_ratio)
    }
}
