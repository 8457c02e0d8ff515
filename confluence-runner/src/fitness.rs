//! Fitness function: which metric a sweep ranks parameter sets by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::metrics::PerformanceMetrics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessMetric {
    #[default]
    Sharpe,
    TotalReturn,
    WinRate,
    ProfitFactor,
    MaxDrawdown,
}

impl FitnessMetric {
    pub const ALL: [FitnessMetric; 5] = [
        FitnessMetric::Sharpe,
        FitnessMetric::TotalReturn,
        FitnessMetric::WinRate,
        FitnessMetric::ProfitFactor,
        FitnessMetric::MaxDrawdown,
    ];

    pub fn extract(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Self::Sharpe => metrics.sharpe,
            Self::TotalReturn => metrics.total_return,
            Self::WinRate => metrics.win_rate,
            Self::ProfitFactor => metrics.profit_factor,
            Self::MaxDrawdown => metrics.max_drawdown,
        }
    }

    /// Returns true if `a` is better than `b`.
    ///
    /// Drawdowns are negative, so a larger value is the smaller loss and plain
    /// `>` holds for every metric.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        a > b
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sharpe => "sharpe",
            Self::TotalReturn => "total_return",
            Self::WinRate => "win_rate",
            Self::ProfitFactor => "profit_factor",
            Self::MaxDrawdown => "max_drawdown",
        }
    }
}

impl fmt::Display for FitnessMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitnessMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown fitness metric '{s}' (expected one of {})", known.join(", "))
            })
    }
}
