//! SignalEngine: one pair from candles to decision.
//!
//! `analyze` runs the detector pipeline, aligns the higher-timeframe trend and
//! computes ATR once per series. Decisions for any candle are then cheap
//! reads of that [`Analysis`], which is what backtests and sweeps rely on.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AnalysisConfig, ConfigError};
use crate::domain::{Candle, CandleSeries, Direction, TradePlan};
use crate::external::{SignalModel, MODEL_COLUMN};
use crate::indicators::{Atr, Indicator};
use crate::pipeline::{AnalysisFrame, DetectorPipeline, EvaluationMode};
use crate::risk::{PlanError, RiskPlanner};
use crate::scoring::{ConfluenceScorer, ScoreEvaluation, TrendFilter, TrendState};

/// Precomputed per-candle inputs of the scorer and planner.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub frame: AnalysisFrame,
    /// Higher-timeframe trend aligned to each candle.
    pub trends: Vec<TrendState>,
    pub atr: Vec<f64>,
}

impl Analysis {
    pub fn len(&self) -> usize {
        self.frame.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_empty()
    }

    pub fn trend_at(&self, index: usize) -> TrendState {
        self.trends.get(index).copied().unwrap_or_default()
    }

    pub fn atr_at(&self, index: usize) -> Option<f64> {
        self.atr.get(index).copied().filter(|v| v.is_finite())
    }

    /// Score candle `index` and plan a trade at its close if a side wins.
    pub fn decide_at(
        &self,
        pair: &str,
        scorer: &ConfluenceScorer,
        planner: &RiskPlanner,
        index: usize,
    ) -> Decision {
        let evaluation = scorer.evaluate(&self.frame, index, self.trend_at(index));
        if evaluation.direction == Direction::Flat {
            return Decision {
                evaluation,
                plan: None,
                plan_error: None,
            };
        }

        let entry = self.frame.candles().get(index).map_or(f64::NAN, |c| c.close);
        let reason = evaluation.reason();
        match planner.plan(pair, evaluation.direction, entry, self.atr_at(index), &reason) {
            Ok(plan) => Decision {
                evaluation,
                plan: Some(plan),
                plan_error: None,
            },
            Err(e) => {
                warn!(pair, index, direction = %evaluation.direction, error = %e, "no trade plan");
                Decision {
                    evaluation,
                    plan: None,
                    plan_error: Some(e),
                }
            }
        }
    }
}

/// Scorer output for one candle plus the plan it produced, if any.
///
/// A plan error never hides the direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub evaluation: ScoreEvaluation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<TradePlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_error: Option<PlanError>,
}

impl Decision {
    pub fn direction(&self) -> Direction {
        self.evaluation.direction
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PairEvaluation {
    pub pair: String,
    #[serde(skip)]
    pub analysis: Analysis,
    pub failed_detectors: Vec<String>,
    /// `None` only for an empty series.
    pub decision: Option<Decision>,
}

impl PairEvaluation {
    pub fn frame(&self) -> &AnalysisFrame {
        &self.analysis.frame
    }

    pub fn direction(&self) -> Direction {
        self.decision.as_ref().map_or(Direction::Flat, Decision::direction)
    }
}

#[derive(Debug)]
pub struct SignalEngine {
    pipeline: DetectorPipeline,
    scorer: ConfluenceScorer,
    trend_filter: TrendFilter,
    planner: RiskPlanner,
}

impl SignalEngine {
    /// Validate `config` and build every stage.
    pub fn new(config: &AnalysisConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            pipeline: DetectorPipeline::from_configs(&config.detectors, config.mode)?,
            scorer: ConfluenceScorer::new(config.scoring.clone()),
            trend_filter: TrendFilter::from_config(&config.trend),
            planner: RiskPlanner::new(config.risk.clone()),
        })
    }

    pub fn pipeline(&self) -> &DetectorPipeline {
        &self.pipeline
    }

    pub fn scorer(&self) -> &ConfluenceScorer {
        &self.scorer
    }

    pub fn planner(&self) -> &RiskPlanner {
        &self.planner
    }

    /// Run the pipeline and precompute trend and ATR columns.
    ///
    /// Without higher-timeframe candles every trend is `Undefined`.
    pub fn analyze(&self, series: &CandleSeries, trend_candles: Option<&[Candle]>) -> Analysis {
        self.analysis_of(self.pipeline.run(series), series, trend_candles)
    }

    fn analysis_of(
        &self,
        frame: AnalysisFrame,
        series: &CandleSeries,
        trend_candles: Option<&[Candle]>,
    ) -> Analysis {
        let trends = match trend_candles {
            Some(higher) => self.trend_filter.align(higher, series),
            None => vec![TrendState::Undefined; series.len()],
        };
        let atr = Atr::new(self.planner.config().atr_period.max(1)).compute(series);
        Analysis { frame, trends, atr }
    }

    /// Decision for the last candle.
    ///
    /// In causal mode only votes from the decided candle on are derived;
    /// earlier signal columns of the returned frame stay neutral.
    pub fn evaluate(
        &self,
        pair: &str,
        series: &CandleSeries,
        trend_candles: Option<&[Candle]>,
    ) -> PairEvaluation {
        let last = series.len().checked_sub(1);
        self.evaluate_inner(pair, series, trend_candles, None, last)
    }

    /// Decision for candle `index` (clamped to the series).
    pub fn evaluate_at(
        &self,
        pair: &str,
        series: &CandleSeries,
        trend_candles: Option<&[Candle]>,
        index: usize,
    ) -> PairEvaluation {
        let index = series.len().checked_sub(1).map(|last| index.min(last));
        self.evaluate_inner(pair, series, trend_candles, None, index)
    }

    /// Decision for the last candle with `model`'s predictions as one more
    /// vote column ([`MODEL_COLUMN`]).
    ///
    /// A failing model is logged and listed among the failed columns; the
    /// detectors still decide.
    pub fn evaluate_with_model(
        &self,
        pair: &str,
        series: &CandleSeries,
        trend_candles: Option<&[Candle]>,
        model: &dyn SignalModel,
    ) -> PairEvaluation {
        let last = series.len().checked_sub(1);
        self.evaluate_inner(pair, series, trend_candles, Some(model), last)
    }

    fn evaluate_inner(
        &self,
        pair: &str,
        series: &CandleSeries,
        trend_candles: Option<&[Candle]>,
        model: Option<&dyn SignalModel>,
        index: Option<usize>,
    ) -> PairEvaluation {
        // causal votes before the decided candle are never read
        let frame = match (self.pipeline.mode(), index) {
            (EvaluationMode::Causal, Some(i)) => self.pipeline.run_causal(series, i),
            _ => self.pipeline.run(series),
        };
        let mut analysis = self.analysis_of(frame, series, trend_candles);
        if let Some(model) = model {
            if let Err(e) = analysis.frame.attach_model(model, None) {
                warn!(pair, model = model.name(), error = %e, "model column skipped");
                analysis.frame.mark_failed(MODEL_COLUMN);
            }
        }
        let decision = index.map(|i| analysis.decide_at(pair, &self.scorer, &self.planner, i));
        if let Some(d) = &decision {
            info!(
                pair,
                direction = %d.direction(),
                buy = d.evaluation.score.buy_score,
                sell = d.evaluation.score.sell_score,
                "pair evaluated"
            );
        }
        PairEvaluation {
            pair: pair.to_string(),
            failed_detectors: analysis.frame.failed().to_vec(),
            analysis,
            decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::{DetectorConfig, DetectorError};
    use crate::domain::Signal;
    use crate::indicators::make_candles;
    use crate::scoring::ScoringConfig;

    fn series(closes: &[f64]) -> CandleSeries {
        CandleSeries::new("EURUSD", make_candles(closes)).unwrap()
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    /// One-detector engine whose threshold any single vote clears.
    fn engine_with(column_weight: f64) -> SignalEngine {
        let config = AnalysisConfig {
            detectors: vec![DetectorConfig::new("mss").with_param("lookback", 3.0)],
            scoring: ScoringConfig::default().with_weight("ml", column_weight),
            mode: EvaluationMode::Retrospective,
            ..AnalysisConfig::default()
        };
        SignalEngine::new(&config).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let mut config = AnalysisConfig::default();
        config.scoring.trend_penalty_factor = 2.0;
        assert!(SignalEngine::new(&config).is_err());
    }

    #[test]
    fn empty_series_has_no_decision() {
        let engine = SignalEngine::new(&AnalysisConfig::default()).unwrap();
        let eval = engine.evaluate("EURUSD", &series(&[]), None);
        assert!(eval.decision.is_none());
        assert_eq!(eval.direction(), Direction::Flat);
    }

    #[test]
    fn quiet_market_is_flat_without_plan() {
        let engine = SignalEngine::new(&AnalysisConfig::default()).unwrap();
        let eval = engine.evaluate("EURUSD", &series(&vec![100.0; 40]), None);
        let decision = eval.decision.unwrap();
        assert_eq!(decision.direction(), Direction::Flat);
        assert!(decision.plan.is_none());
        assert!(decision.plan_error.is_none());
        assert!(eval.failed_detectors.is_empty());
    }

    #[test]
    fn winning_vote_produces_plan_at_close() {
        let engine = engine_with(5.0);
        let mut analysis = engine.analyze(&series(&rising(30)), None);
        let mut votes = vec![Signal::Neutral; 30];
        votes[29] = Signal::Bullish;
        analysis.frame.insert_signal("ml", votes).unwrap();

        let decision = analysis.decide_at("EURUSD", engine.scorer(), engine.planner(), 29);
        assert_eq!(decision.direction(), Direction::Buy);
        let plan = decision.plan.unwrap();
        assert_eq!(plan.entry_price, 129.0);
        assert_eq!(plan.atr, analysis.atr[29]);
        assert!(plan.reason.contains("ml"));
    }

    #[test]
    fn missing_atr_surfaces_direction_without_plan() {
        let engine = engine_with(5.0);
        let mut analysis = engine.analyze(&series(&rising(5)), None);
        analysis
            .frame
            .insert_signal("ml", vec![Signal::Bearish; 5])
            .unwrap();
        let decision = analysis.decide_at("EURUSD", engine.scorer(), engine.planner(), 4);
        assert_eq!(decision.direction(), Direction::Sell);
        assert!(decision.plan.is_none());
        assert_eq!(decision.plan_error, Some(PlanError::MissingVolatility));
    }

    #[test]
    fn trend_candles_are_aligned() {
        let engine = SignalEngine::new(&AnalysisConfig::default()).unwrap();
        let lower = series(&rising(60));
        let analysis = engine.analyze(&lower, Some(lower.candles()));
        assert_eq!(analysis.trend_at(10), TrendState::Undefined);
        assert_eq!(analysis.trend_at(59), TrendState::Up);
        assert_eq!(analysis.trend_at(999), TrendState::Undefined);
    }

    #[test]
    fn evaluate_at_clamps_index() {
        let engine = SignalEngine::new(&AnalysisConfig::default()).unwrap();
        let eval = engine.evaluate_at("EURUSD", &series(&rising(10)), None, 500);
        assert_eq!(eval.decision.unwrap().evaluation.index, 9);
    }

    struct Constant(Signal);

    impl SignalModel for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn predict(&self, candles: &[Candle]) -> Result<Vec<Signal>, DetectorError> {
            Ok(vec![self.0; candles.len()])
        }
    }

    struct Broken;

    impl SignalModel for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn predict(&self, _: &[Candle]) -> Result<Vec<Signal>, DetectorError> {
            Err(DetectorError::Failed("weights missing".into()))
        }
    }

    #[test]
    fn model_column_votes_like_a_detector() {
        let config = AnalysisConfig {
            detectors: vec![DetectorConfig::new("mss").with_param("lookback", 3.0)],
            scoring: ScoringConfig::default().with_weight(MODEL_COLUMN, 5.0),
            ..AnalysisConfig::default()
        };
        let engine = SignalEngine::new(&config).unwrap();
        let s = series(&rising(30));

        let eval = engine.evaluate_with_model("EURUSD", &s, None, &Constant(Signal::Bearish));
        assert_eq!(eval.direction(), Direction::Sell);
        assert_eq!(eval.frame().signal(MODEL_COLUMN, 29), Signal::Bearish);
        assert!(eval.decision.unwrap().plan.is_some());

        let eval = engine.evaluate_with_model("EURUSD", &s, None, &Broken);
        assert_eq!(eval.direction(), Direction::Flat);
        assert_eq!(eval.failed_detectors, vec![MODEL_COLUMN.to_string()]);
    }

    #[test]
    fn causal_evaluate_matches_full_causal_pass() {
        let config = AnalysisConfig {
            mode: EvaluationMode::Causal,
            ..AnalysisConfig::default()
        };
        let engine = SignalEngine::new(&config).unwrap();
        let closes: Vec<f64> = (0..120)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 4.0 + i as f64 * 0.05)
            .collect();
        let s = series(&closes);

        let full = engine.analyze(&s, None);
        for index in [119, 80] {
            let expected = full.decide_at("EURUSD", engine.scorer(), engine.planner(), index);
            let eval = engine.evaluate_at("EURUSD", &s, None, index);
            assert_eq!(eval.decision.clone().unwrap(), expected);
            for name in engine.pipeline().names() {
                assert_eq!(eval.frame().signal(name, index), full.frame.signal(name, index));
            }
        }
        let eval = engine.evaluate("EURUSD", &s, None);
        for name in engine.pipeline().names() {
            assert_eq!(eval.frame().signal(name, 0), Signal::Neutral);
        }
    }

    #[test]
    fn serializes_without_frame() {
        let engine = SignalEngine::new(&AnalysisConfig::default()).unwrap();
        let eval = engine.evaluate("EURUSD", &series(&rising(10)), None);
        let json = serde_json::to_value(&eval).unwrap();
        assert_eq!(json["pair"], "EURUSD");
        assert!(json.get("analysis").is_none());
        assert_eq!(json["decision"]["evaluation"]["direction"], "NONE");
    }
}
