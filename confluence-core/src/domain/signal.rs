//! Per-candle detector vote.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorical vote a detector attaches to one candle: -1, 0 or +1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Signal {
    Bearish,
    #[default]
    Neutral,
    Bullish,
}

impl Signal {
    pub fn as_i8(self) -> i8 {
        match self {
            Signal::Bearish => -1,
            Signal::Neutral => 0,
            Signal::Bullish => 1,
        }
    }

    pub fn is_neutral(self) -> bool {
        self == Signal::Neutral
    }
}

impl From<Signal> for i8 {
    fn from(signal: Signal) -> Self {
        signal.as_i8()
    }
}

impl TryFrom<i8> for Signal {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Signal::Bearish),
            0 => Ok(Signal::Neutral),
            1 => Ok(Signal::Bullish),
            other => Err(format!("signal value must be -1, 0 or 1, got {other}")),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}
