//! ATR risk planner: turns a directional decision into a trade plan.
//!
//! For entry `E`, volatility `A`, stop multiplier `m` and reward ratio `r`:
//! - BUY:  stop `E - A*m`, target `E + A*m*r`, trailing activation `E + A*m`
//! - SELL: stop `E + A*m`, target `E - A*m*r`, trailing activation `E - A*m`
//!
//! Position size, when account settings are present, risks
//! `capital * pct` over the entry-to-stop distance.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::domain::{Candle, Direction, TradePlan};
use crate::indicators::Atr;

#[derive(Debug, Clone, Error, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanError {
    #[error("missing volatility data (ATR unavailable)")]
    MissingVolatility,

    #[error("no direction to plan for")]
    NoDirection,

    #[error("invalid entry price {0}")]
    InvalidEntry(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub sl_atr_multiplier: f64,
    pub risk_reward_ratio: f64,
    pub atr_period: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_capital: Option<f64>,
    /// Fraction of capital risked per trade, e.g. `0.01`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_per_trade_pct: Option<f64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sl_atr_multiplier: 1.5,
            risk_reward_ratio: 2.0,
            atr_period: 14,
            account_capital: None,
            risk_per_trade_pct: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskPlanner {
    config: RiskConfig,
    atr: Atr,
}

impl RiskPlanner {
    pub fn new(config: RiskConfig) -> Self {
        let atr = Atr::new(config.atr_period.max(1));
        Self { config, atr }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Latest ATR of `candles`, if out of warmup.
    pub fn volatility(&self, candles: &[Candle]) -> Option<f64> {
        self.atr.latest(candles)
    }

    /// Build a plan from an explicit entry and ATR.
    pub fn plan(
        &self,
        pair: &str,
        direction: Direction,
        entry_price: f64,
        atr: Option<f64>,
        reason: &str,
    ) -> Result<TradePlan, PlanError> {
        if direction.is_flat() {
            return Err(PlanError::NoDirection);
        }
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(PlanError::InvalidEntry(entry_price));
        }
        let atr = atr
            .filter(|a| a.is_finite() && *a >= 0.0)
            .ok_or(PlanError::MissingVolatility)?;

        let sign = direction.sign();
        let stop_distance = atr * self.config.sl_atr_multiplier;
        let stop_loss = entry_price - sign * stop_distance;
        let take_profit = entry_price + sign * stop_distance * self.config.risk_reward_ratio;
        let trailing_stop_activation_price = entry_price + sign * (entry_price - stop_loss).abs();
        let position_size = self.position_size(entry_price, stop_loss);

        let plan = TradePlan {
            pair: pair.to_string(),
            direction,
            entry_price,
            stop_loss,
            take_profit,
            position_size,
            trailing_stop_activation_price,
            atr,
            risk_reward_ratio: self.config.risk_reward_ratio,
            reason: reason.to_string(),
        };
        info!(
            pair,
            %direction,
            entry = entry_price,
            stop = stop_loss,
            target = take_profit,
            "trade plan created"
        );
        Ok(plan)
    }

    /// Plan at the close of the last candle, using ATR over `candles`.
    pub fn plan_from_candles(
        &self,
        pair: &str,
        direction: Direction,
        candles: &[Candle],
        reason: &str,
    ) -> Result<TradePlan, PlanError> {
        let entry = candles.last().map_or(f64::NAN, |c| c.close);
        self.plan(pair, direction, entry, self.volatility(candles), reason)
    }

    fn position_size(&self, entry: f64, stop: f64) -> Option<f64> {
        let capital = self.config.account_capital?;
        let pct = self.config.risk_per_trade_pct?;
        let risk = (entry - stop).abs();
        if risk == 0.0 {
            return Some(0.0);
        }
        Some(capital * pct / risk)
    }
}

impl Default for RiskPlanner {
    fn default() -> Self {
        Self::new(RiskConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    fn planner(m: f64, rr: f64) -> RiskPlanner {
        RiskPlanner::new(RiskConfig {
            sl_atr_multiplier: m,
            risk_reward_ratio: rr,
            ..RiskConfig::default()
        })
    }

    #[test]
    fn buy_levels() {
        let plan = planner(1.5, 3.0)
            .plan("EURUSD", Direction::Buy, 1.2, Some(0.001), "test")
            .unwrap();
        assert_approx(plan.stop_loss, 1.1985, DEFAULT_EPSILON);
        assert_approx(plan.take_profit, 1.2045, DEFAULT_EPSILON);
        assert_approx(plan.trailing_stop_activation_price, 1.2015, DEFAULT_EPSILON);
        assert_eq!(plan.position_size, None);
    }

    #[test]
    fn sell_levels_mirror() {
        let plan = planner(1.5, 3.0)
            .plan("EURUSD", Direction::Sell, 1.2, Some(0.001), "test")
            .unwrap();
        assert_approx(plan.stop_loss, 1.2015, DEFAULT_EPSILON);
        assert_approx(plan.take_profit, 1.1955, DEFAULT_EPSILON);
        assert_approx(plan.trailing_stop_activation_price, 1.1985, DEFAULT_EPSILON);
    }

    #[test]
    fn missing_atr_means_no_plan() {
        let p = planner(1.5, 2.0);
        assert_eq!(
            p.plan("X", Direction::Buy, 1.2, None, ""),
            Err(PlanError::MissingVolatility)
        );
        assert_eq!(
            p.plan("X", Direction::Buy, 1.2, Some(f64::NAN), ""),
            Err(PlanError::MissingVolatility)
        );
        assert_eq!(
            p.plan("X", Direction::Flat, 1.2, Some(0.001), ""),
            Err(PlanError::NoDirection)
        );
        assert_eq!(
            p.plan("X", Direction::Buy, 0.0, Some(0.001), ""),
            Err(PlanError::InvalidEntry(0.0))
        );
    }

    #[test]
    fn position_size_from_account_risk() {
        let p = RiskPlanner::new(RiskConfig {
            account_capital: Some(10_000.0),
            risk_per_trade_pct: Some(0.01),
            ..RiskConfig::default()
        });
        let plan = p.plan("X", Direction::Buy, 100.0, Some(2.0), "").unwrap();
        // stop distance 3.0 -> 100 / 3
        assert_approx(plan.position_size.unwrap(), 100.0 / 3.0, DEFAULT_EPSILON);

        let zero = p.plan("X", Direction::Buy, 100.0, Some(0.0), "").unwrap();
        assert_eq!(zero.position_size, Some(0.0));
    }

    #[test]
    fn short_history_has_no_volatility() {
        let candles = make_candles(&[1.0, 1.1, 1.2]);
        let p = RiskPlanner::default();
        assert_eq!(
            p.plan_from_candles("X", Direction::Buy, &candles, ""),
            Err(PlanError::MissingVolatility)
        );
        let long: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let plan = p
            .plan_from_candles("X", Direction::Buy, &make_candles(&long), "")
            .unwrap();
        assert_eq!(plan.entry_price, 129.0);
        assert!(plan.stop_loss < plan.entry_price);
    }
}
