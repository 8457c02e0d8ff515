//! Walk-forward backtest over a precomputed [`Analysis`].
//!
//! One position at a time. A decision at candle `i` enters at that candle's
//! close, or at the next candle's open under [`FillPolicy::NextOpen`] with the
//! stop and target moved by the same gap. Exits are checked against the
//! plan's stop and target from candle `i + 1` on, which for next-open fills
//! includes the fill candle itself. When a single candle touches both, the stop wins. A position still open
//! after the last candle is closed at its close.
//!
//! The detector pipeline runs once per series; [`simulate`] only re-reads its
//! columns, which is what keeps parameter sweeps cheap. In retrospective mode
//! some detectors label candles using later data, so only
//! [`EvaluationMode::Causal`](confluence_core::EvaluationMode::Causal)
//! results are free of look-ahead.

use chrono::NaiveDateTime;
use confluence_core::domain::{Candle, CandleSeries, Direction, TradePlan};
use confluence_core::{Analysis, AnalysisConfig, ConfigError, ConfluenceScorer, EvaluationMode};
use confluence_core::{RiskPlanner, SignalEngine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::data_loader::dataset_hash;
use crate::metrics::PerformanceMetrics;

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("series '{0}' has no candles")]
    EmptySeries(String),

    #[error("invalid backtest options: {0}")]
    InvalidOptions(String),

    #[error("invalid sweep grid: {0}")]
    InvalidGrid(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Price at which a decision becomes a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// The decided candle's close, which is the plan's own entry.
    #[default]
    SignalClose,
    /// The following candle's open.
    NextOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestOptions {
    pub initial_capital: f64,
    /// Charged on the notional of both entry and exit.
    pub commission_rate: f64,
    /// Share of current equity committed per trade when the plan carries no
    /// position size.
    pub position_fraction: f64,
    /// First candle allowed to open a trade.
    pub start_index: usize,
    pub fill: FillPolicy,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            commission_rate: 0.001,
            position_fraction: 1.0,
            start_index: 0,
            fill: FillPolicy::SignalClose,
        }
    }
}

impl BacktestOptions {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(BacktestError::InvalidOptions(format!(
                "initial_capital must be > 0, got {}",
                self.initial_capital
            )));
        }
        if !(0.0..1.0).contains(&self.commission_rate) {
            return Err(BacktestError::InvalidOptions(format!(
                "commission_rate must be in [0, 1), got {}",
                self.commission_rate
            )));
        }
        if !(self.position_fraction > 0.0 && self.position_fraction <= 1.0) {
            return Err(BacktestError::InvalidOptions(format!(
                "position_fraction must be in (0, 1], got {}",
                self.position_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    EndOfData,
}

/// One completed round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub pair: String,
    pub direction: Direction,
    pub entry_index: usize,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_index: usize,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub quantity: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub exit_reason: ExitReason,
    pub gross_pnl: f64,
    pub commission: f64,
    pub net_pnl: f64,
    /// Net P&L over entry notional.
    pub return_pct: f64,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }

    pub fn holding_candles(&self) -> usize {
        self.exit_index - self.entry_index
    }
}

/// Trades, per-candle equity and metrics of one simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub trades: Vec<TradeRecord>,
    /// Marked to market at every candle's close.
    pub equity_curve: Vec<f64>,
    pub metrics: PerformanceMetrics,
}

/// A backtest together with the inputs that identify it.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestResult {
    pub pair: String,
    pub mode: EvaluationMode,
    pub config_fingerprint: String,
    pub dataset_hash: String,
    pub options: BacktestOptions,
    #[serde(flatten)]
    pub report: BacktestReport,
}

// ─── Simulation ─────────────────────────────────────────────────────

struct OpenPosition {
    plan: TradePlan,
    entry_index: usize,
    quantity: f64,
    entry_commission: f64,
}

/// `plan` re-anchored at `price`, keeping its stop and target distances.
fn filled_at(mut plan: TradePlan, price: f64) -> TradePlan {
    let gap = price - plan.entry_price;
    plan.entry_price = price;
    plan.stop_loss += gap;
    plan.take_profit += gap;
    plan.trailing_stop_activation_price += gap;
    plan
}

impl OpenPosition {
    /// Size `plan` against `realized` equity and charge the entry
    /// commission; `None` for a degenerate size.
    fn open(
        plan: TradePlan,
        entry_index: usize,
        realized: &mut f64,
        options: &BacktestOptions,
    ) -> Option<Self> {
        let quantity = plan
            .position_size
            .unwrap_or(*realized * options.position_fraction / plan.entry_price);
        if !(quantity.is_finite() && quantity > 0.0) {
            return None;
        }
        let entry_commission = options.commission_rate * plan.entry_price * quantity;
        *realized -= entry_commission;
        debug!(pair = %plan.pair, index = entry_index, direction = %plan.direction, quantity, "position opened");
        Some(Self {
            plan,
            entry_index,
            quantity,
            entry_commission,
        })
    }

    fn unrealized(&self, price: f64) -> f64 {
        self.plan.direction.sign() * (price - self.plan.entry_price) * self.quantity
    }

    /// Fill price if `candle` reaches the stop or the target.
    fn exit_on(&self, candle: &Candle) -> Option<(f64, ExitReason)> {
        let plan = &self.plan;
        match plan.direction {
            Direction::Buy => {
                if candle.low <= plan.stop_loss {
                    Some((candle.open.min(plan.stop_loss), ExitReason::StopLoss))
                } else if candle.high >= plan.take_profit {
                    Some((candle.open.max(plan.take_profit), ExitReason::TakeProfit))
                } else {
                    None
                }
            }
            Direction::Sell => {
                if candle.high >= plan.stop_loss {
                    Some((candle.open.max(plan.stop_loss), ExitReason::StopLoss))
                } else if candle.low <= plan.take_profit {
                    Some((candle.open.min(plan.take_profit), ExitReason::TakeProfit))
                } else {
                    None
                }
            }
            Direction::Flat => None,
        }
    }

    fn close(
        self,
        candles: &[Candle],
        exit_index: usize,
        exit_price: f64,
        exit_reason: ExitReason,
        commission_rate: f64,
    ) -> TradeRecord {
        let gross_pnl = self.unrealized(exit_price);
        let commission = self.entry_commission + commission_rate * exit_price * self.quantity;
        let net_pnl = gross_pnl - commission;
        let notional = self.plan.entry_price * self.quantity;
        TradeRecord {
            pair: self.plan.pair,
            direction: self.plan.direction,
            entry_index: self.entry_index,
            entry_time: candles[self.entry_index].timestamp,
            entry_price: self.plan.entry_price,
            exit_index,
            exit_time: candles[exit_index].timestamp,
            exit_price,
            quantity: self.quantity,
            stop_loss: self.plan.stop_loss,
            take_profit: self.plan.take_profit,
            exit_reason,
            gross_pnl,
            commission,
            net_pnl,
            return_pct: if notional > 0.0 { net_pnl / notional } else { 0.0 },
        }
    }
}

/// Replay `analysis` candle by candle with the given scorer and planner.
pub fn simulate(
    analysis: &Analysis,
    pair: &str,
    scorer: &ConfluenceScorer,
    planner: &RiskPlanner,
    options: &BacktestOptions,
) -> BacktestReport {
    let candles = analysis.frame.candles();
    let rate = options.commission_rate;
    let mut realized = options.initial_capital;
    let mut equity_curve = Vec::with_capacity(candles.len());
    let mut trades = Vec::new();
    let mut open: Option<OpenPosition> = None;
    let mut pending: Option<TradePlan> = None;

    for (i, candle) in candles.iter().enumerate() {
        if let Some(plan) = pending.take() {
            open = OpenPosition::open(filled_at(plan, candle.open), i, &mut realized, options);
        }

        if let Some(position) = open.take() {
            match position.exit_on(candle) {
                Some((price, reason)) => {
                    let trade = position.close(candles, i, price, reason, rate);
                    realized += trade.gross_pnl - rate * price * trade.quantity;
                    trades.push(trade);
                }
                None => open = Some(position),
            }
        }

        // ATR warm-up candles cannot produce a plan; the last candle has no exit
        let can_enter = i >= options.start_index && i + 1 < candles.len();
        if open.is_none() && can_enter && analysis.atr_at(i).is_some() {
            let decision = analysis.decide_at(pair, scorer, planner, i);
            match (decision.plan, options.fill) {
                (Some(plan), FillPolicy::NextOpen) => pending = Some(plan),
                (Some(plan), FillPolicy::SignalClose) => {
                    open = OpenPosition::open(plan, i, &mut realized, options);
                }
                (None, _) => {}
            }
        }

        let mark = open.as_ref().map_or(0.0, |p| p.unrealized(candle.close));
        equity_curve.push(realized + mark);
    }

    if let (Some(position), Some(last)) = (open, candles.len().checked_sub(1)) {
        let price = candles[last].close;
        let trade = position.close(candles, last, price, ExitReason::EndOfData, rate);
        let exit_commission = rate * price * trade.quantity;
        realized += trade.gross_pnl - exit_commission;
        if let Some(final_equity) = equity_curve.last_mut() {
            *final_equity = realized;
        }
        trades.push(trade);
    }

    let metrics = PerformanceMetrics::compute(&equity_curve, &trades, options.initial_capital);
    BacktestReport {
        trades,
        equity_curve,
        metrics,
    }
}

/// Analyse `series` under `config` and replay it.
pub fn run_backtest(
    series: &CandleSeries,
    trend: Option<&CandleSeries>,
    config: &AnalysisConfig,
    options: &BacktestOptions,
) -> Result<BacktestResult, BacktestError> {
    if series.is_empty() {
        return Err(BacktestError::EmptySeries(series.symbol().to_string()));
    }
    options.validate()?;
    let engine = SignalEngine::new(config)?;
    let analysis = engine.analyze(series, trend.map(CandleSeries::candles));
    let report = simulate(&analysis, series.symbol(), engine.scorer(), engine.planner(), options);

    info!(
        pair = series.symbol(),
        trades = report.metrics.trade_count,
        total_return = report.metrics.total_return,
        sharpe = report.metrics.sharpe,
        "backtest finished"
    );
    Ok(BacktestResult {
        pair: series.symbol().to_string(),
        mode: config.mode,
        config_fingerprint: config.fingerprint()?,
        dataset_hash: dataset_hash(series),
        options: options.clone(),
        report,
    })
}
