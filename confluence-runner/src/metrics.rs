//! Performance metrics: pure functions over an equity curve and trade list.

use serde::{Deserialize, Serialize};

use crate::backtest::TradeRecord;

/// Aggregate performance of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub trade_count: usize,
    pub win_rate: f64,
    /// Fractional change of equity over the run.
    pub total_return: f64,
    /// Mean over standard deviation of per-trade returns, not annualised.
    pub sharpe: f64,
    /// Largest peak-to-trough decline as a negative fraction.
    pub max_drawdown: f64,
    pub profit_factor: f64,
    pub avg_trade_return: f64,
    pub final_equity: f64,
}

impl PerformanceMetrics {
    pub fn compute(equity_curve: &[f64], trades: &[TradeRecord], initial_capital: f64) -> Self {
        let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
        Self {
            trade_count: trades.len(),
            win_rate: win_rate(trades),
            total_return: total_return(equity_curve),
            sharpe: sharpe_ratio(&returns),
            max_drawdown: max_drawdown(equity_curve),
            profit_factor: profit_factor(trades),
            avg_trade_return: mean_f64(&returns),
            final_equity: equity_curve.last().copied().unwrap_or(initial_capital),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&last)) if equity_curve.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Mean over sample standard deviation of `returns`.
///
/// Returns 0.0 with fewer than two returns or zero variance.
pub fn sharpe_ratio(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(returns) / std
}

/// Maximum drawdown as a negative fraction (e.g. -0.15 = 15% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

pub fn win_rate(trades: &[TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
}

/// Gross profits over gross losses, capped at 100.0 when nothing was lost.
pub fn profit_factor(trades: &[TradeRecord]) -> f64 {
    let gross_profit: f64 = trades.iter().map(|t| t.net_pnl.max(0.0)).sum();
    let gross_loss: f64 = trades.iter().map(|t| (-t.net_pnl).max(0.0)).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

// ─── Helpers ────────────────────────────────────────────────────────

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
