//! Grid parameter sweep over scorer weights, threshold, trend penalty and the
//! planner's stop and reward multipliers.
//!
//! The detector pipeline runs once; every grid point re-scores the same
//! [`Analysis`](confluence_core::Analysis) with its own scorer and planner, in
//! parallel. An empty axis keeps the base configuration's value.

use std::collections::BTreeMap;

use confluence_core::domain::CandleSeries;
use confluence_core::{
    AnalysisConfig, ConfluenceScorer, RiskConfig, RiskPlanner, ScoringConfig, SignalEngine,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtest::{simulate, BacktestError, BacktestOptions};
use crate::fitness::FitnessMetric;
use crate::metrics::PerformanceMetrics;

/// Values to try per parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepGrid {
    /// Candidate weights per signal column.
    pub weights: BTreeMap<String, Vec<f64>>,
    pub thresholds: Vec<f64>,
    pub penalties: Vec<f64>,
    pub sl_multipliers: Vec<f64>,
    pub risk_rewards: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
enum Param<'a> {
    Weight(&'a str),
    Threshold,
    Penalty,
    StopMultiplier,
    RiskReward,
}

fn steps(from: f64, to: f64, step: f64) -> Vec<f64> {
    let count = ((to - from) / step).round() as usize;
    (0..=count).map(|i| from + step * i as f64).collect()
}

impl SweepGrid {
    /// Six detector weights, threshold 2.0..=4.0 and penalty 0.1..=1.0;
    /// 102 400 points.
    pub fn standard() -> Self {
        let weights = BTreeMap::from([
            ("sr".to_string(), steps(0.5, 2.0, 0.5)),
            ("order_block".to_string(), steps(1.0, 3.0, 0.5)),
            ("fvg".to_string(), steps(0.5, 2.0, 0.5)),
            ("mss".to_string(), steps(1.5, 3.0, 0.5)),
            ("fibonacci".to_string(), steps(1.0, 2.5, 0.5)),
            ("bos_choch_ob".to_string(), steps(1.0, 2.5, 0.5)),
        ]);
        Self {
            weights,
            thresholds: steps(2.0, 4.0, 0.5),
            penalties: steps(0.1, 1.0, 0.3),
            ..Self::default()
        }
    }

    /// Threshold, penalty and the risk multipliers only; 80 points.
    pub fn scoring_only() -> Self {
        Self {
            thresholds: steps(2.0, 4.0, 0.5),
            penalties: steps(0.1, 1.0, 0.3),
            sl_multipliers: vec![1.0, 1.5, 2.0, 2.5],
            risk_rewards: vec![1.5, 2.0],
            ..Self::default()
        }
    }

    fn axes(&self) -> Vec<(Param<'_>, &[f64])> {
        let mut axes: Vec<(Param<'_>, &[f64])> = self
            .weights
            .iter()
            .map(|(column, values)| (Param::Weight(column.as_str()), values.as_slice()))
            .collect();
        axes.push((Param::Threshold, &self.thresholds));
        axes.push((Param::Penalty, &self.penalties));
        axes.push((Param::StopMultiplier, &self.sl_multipliers));
        axes.push((Param::RiskReward, &self.risk_rewards));
        axes.retain(|(_, values)| !values.is_empty());
        axes
    }

    /// Number of grid points; an all-empty grid is the base point alone.
    pub fn len(&self) -> usize {
        self.axes().iter().map(|(_, values)| values.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        let bad = |what: &str, v: f64| BacktestError::InvalidGrid(format!("{what} value {v}"));
        for (column, values) in &self.weights {
            if let Some(&v) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                return Err(bad(&format!("weight '{column}'"), v));
            }
        }
        if let Some(&v) = self.thresholds.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(bad("threshold", v));
        }
        if let Some(&v) = self.penalties.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(bad("penalty", v));
        }
        let risk_axes = [
            ("sl multiplier", &self.sl_multipliers),
            ("risk-reward", &self.risk_rewards),
        ];
        for (what, values) in risk_axes {
            if let Some(&v) = values.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
                return Err(bad(what, v));
            }
        }
        Ok(())
    }

    /// Grid point `index`, the last axis varying fastest.
    pub fn point(&self, index: usize, base: &AnalysisConfig) -> Option<SweepPoint> {
        let axes = self.axes();
        let total: usize = axes.iter().map(|(_, values)| values.len()).product();
        if index >= total {
            return None;
        }
        let mut scoring = base.scoring.clone();
        let mut risk = base.risk.clone();
        let mut rest = index;
        for (param, values) in axes.iter().rev() {
            let value = values[rest % values.len()];
            rest /= values.len();
            match param {
                Param::Weight(column) => {
                    scoring.weights.insert((*column).to_string(), value);
                }
                Param::Threshold => scoring.signal_threshold = value,
                Param::Penalty => scoring.trend_penalty_factor = value,
                Param::StopMultiplier => risk.sl_atr_multiplier = value,
                Param::RiskReward => risk.risk_reward_ratio = value,
            }
        }
        Some(SweepPoint { scoring, risk })
    }
}

/// The tunable part of an [`AnalysisConfig`] at one grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub scoring: ScoringConfig,
    pub risk: RiskConfig,
}

impl SweepPoint {
    /// `base` with this point's scoring and risk settings.
    pub fn apply(&self, base: &AnalysisConfig) -> AnalysisConfig {
        AnalysisConfig {
            scoring: self.scoring.clone(),
            risk: self.risk.clone(),
            ..base.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome {
    /// Position in grid order.
    pub index: usize,
    pub point: SweepPoint,
    pub metrics: PerformanceMetrics,
    pub fitness: f64,
}

/// Outcomes sorted best first; ties keep grid order.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResults {
    pub metric: FitnessMetric,
    outcomes: Vec<SweepOutcome>,
}

impl SweepResults {
    fn new(metric: FitnessMetric, mut outcomes: Vec<SweepOutcome>) -> Self {
        outcomes.sort_by(|a, b| {
            b.fitness
                .total_cmp(&a.fitness)
                .then_with(|| a.index.cmp(&b.index))
        });
        Self { metric, outcomes }
    }

    pub fn all(&self) -> &[SweepOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn best(&self) -> Option<&SweepOutcome> {
        self.outcomes.first()
    }

    pub fn top_n(&self, n: usize) -> &[SweepOutcome] {
        &self.outcomes[..n.min(self.outcomes.len())]
    }
}

/// Backtest every point of `grid` on one series and rank by `metric`.
pub fn run_sweep(
    series: &CandleSeries,
    trend: Option<&CandleSeries>,
    base: &AnalysisConfig,
    grid: &SweepGrid,
    options: &BacktestOptions,
    metric: FitnessMetric,
) -> Result<SweepResults, BacktestError> {
    if series.is_empty() {
        return Err(BacktestError::EmptySeries(series.symbol().to_string()));
    }
    options.validate()?;
    grid.validate()?;
    let engine = SignalEngine::new(base)?;
    let analysis = engine.analyze(series, trend.map(CandleSeries::candles));
    let pair = series.symbol();
    let total = grid.len();
    info!(pair, points = total, %metric, "sweep started");

    let outcomes: Vec<SweepOutcome> = (0..total)
        .into_par_iter()
        .filter_map(|index| grid.point(index, base).map(|point| (index, point)))
        .map(|(index, point)| {
            let scorer = ConfluenceScorer::new(point.scoring.clone());
            let planner = RiskPlanner::new(point.risk.clone());
            let report = simulate(&analysis, pair, &scorer, &planner, options);
            let fitness = metric.extract(&report.metrics);
            SweepOutcome {
                index,
                point,
                metrics: report.metrics,
                fitness,
            }
        })
        .collect();

    let results = SweepResults::new(metric, outcomes);
    if let Some(best) = results.best() {
        info!(
            pair,
            %metric,
            fitness = best.fitness,
            trades = best.metrics.trade_count,
            index = best.index,
            "sweep finished"
        );
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_grid_matches_tuning_ranges() {
        let grid = SweepGrid::standard();
        assert_eq!(grid.weights["order_block"], vec![1.0, 1.5, 2.0, 2.5, 3.0]);
        assert_eq!(grid.weights["sr"], vec![0.5, 1.0, 1.5, 2.0]);
        assert_eq!(grid.thresholds, vec![2.0, 2.5, 3.0, 3.5, 4.0]);
        assert_eq!(grid.penalties.len(), 4);
        assert!((grid.penalties[3] - 1.0).abs() < 1e-12);
        assert_eq!(grid.len(), 4 * 5 * 4 * 4 * 4 * 4 * 5 * 4);
        assert!(grid.validate().is_ok());
        assert_eq!(SweepGrid::scoring_only().len(), 80);
    }

    #[test]
    fn empty_grid_is_the_base_point() {
        let base = AnalysisConfig::default();
        let grid = SweepGrid::default();
        assert_eq!(grid.len(), 1);
        assert!(!grid.is_empty());
        let point = grid.point(0, &base).unwrap();
        assert_eq!(point.scoring, base.scoring);
        assert_eq!(point.risk, base.risk);
        assert!(grid.point(1, &base).is_none());
    }

    #[test]
    fn points_enumerate_every_combination_once() {
        let base = AnalysisConfig::default();
        let grid = SweepGrid {
            weights: BTreeMap::from([("mss".to_string(), vec![1.0, 2.0])]),
            thresholds: vec![2.0, 3.0, 4.0],
            risk_rewards: vec![1.5, 3.0],
            ..SweepGrid::default()
        };
        assert_eq!(grid.len(), 12);

        let combos: Vec<(f64, f64, f64)> = (0..grid.len())
            .map(|i| {
                let p = grid.point(i, &base).unwrap();
                (p.scoring.weight("mss"), p.scoring.signal_threshold, p.risk.risk_reward_ratio)
            })
            .collect();
        // last axis fastest
        assert_eq!(combos[0], (1.0, 2.0, 1.5));
        assert_eq!(combos[1], (1.0, 2.0, 3.0));
        assert_eq!(combos[2], (1.0, 3.0, 1.5));
        assert_eq!(combos[11], (2.0, 4.0, 3.0));
        for (i, a) in combos.iter().enumerate() {
            assert!(combos[i + 1..].iter().all(|b| b != a));
        }

        // untouched parameters keep the base values
        let p = grid.point(5, &base).unwrap();
        assert_eq!(p.scoring.weight("sr"), base.scoring.weight("sr"));
        assert_eq!(p.scoring.trend_penalty_factor, base.scoring.trend_penalty_factor);
        assert_eq!(p.risk.sl_atr_multiplier, base.risk.sl_atr_multiplier);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cases = [
            SweepGrid {
                weights: BTreeMap::from([("sr".to_string(), vec![1.0, -0.5])]),
                ..SweepGrid::default()
            },
            SweepGrid {
                penalties: vec![1.2],
                ..SweepGrid::default()
            },
            SweepGrid {
                sl_multipliers: vec![0.0],
                ..SweepGrid::default()
            },
            SweepGrid {
                thresholds: vec![f64::NAN],
                ..SweepGrid::default()
            },
        ];
        for grid in cases {
            assert!(matches!(grid.validate(), Err(BacktestError::InvalidGrid(_))));
        }
    }

    #[test]
    fn apply_keeps_detectors_and_mode() {
        let base = AnalysisConfig::default();
        let grid = SweepGrid::scoring_only();
        let config = grid.point(7, &base).unwrap().apply(&base);
        assert_eq!(config.detectors, base.detectors);
        assert_eq!(config.mode, base.mode);
        assert!(config.validate().is_ok());
        assert_ne!(config.fingerprint().unwrap(), base.fingerprint().unwrap());
    }
}
