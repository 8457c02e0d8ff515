//! Multi-pair evaluation: one [`SignalEngine`] per pair, pairs in parallel.

use std::fmt::Display;

use confluence_core::domain::{Candle, CandleSeries};
use confluence_core::{
    AnalysisConfig, ConfigError, ModelCache, PairEvaluation, SignalEngine, SignalModel,
};
use rayon::prelude::*;
use tracing::info;

use crate::selector::order_by_volatility;

/// Candles for one pair plus its optional higher-timeframe series.
#[derive(Debug, Clone)]
pub struct PairInput {
    pub pair: String,
    pub series: CandleSeries,
    pub trend: Option<CandleSeries>,
}

impl PairInput {
    /// Input named after the series' symbol.
    pub fn new(series: CandleSeries) -> Self {
        Self {
            pair: series.symbol().to_string(),
            series,
            trend: None,
        }
    }

    pub fn with_trend(mut self, trend: CandleSeries) -> Self {
        self.trend = Some(trend);
        self
    }

    fn trend_candles(&self) -> Option<&[Candle]> {
        self.trend.as_ref().map(CandleSeries::candles)
    }
}

/// Evaluate the last candle of every pair. Results keep input order.
pub fn evaluate_pairs(
    inputs: &[PairInput],
    config: &AnalysisConfig,
) -> Result<Vec<PairEvaluation>, ConfigError> {
    config.validate()?;
    let results = inputs
        .par_iter()
        .map(|input| {
            let engine = SignalEngine::new(config)?;
            Ok(engine.evaluate(&input.pair, &input.series, input.trend_candles()))
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;
    log_summary(&results);
    Ok(results)
}

/// Rank pairs by daily ATR and evaluate the ranked ones, most volatile first.
///
/// Pairs without enough daily history for the ATR are dropped.
pub fn evaluate_pairs_by_volatility(
    inputs: &[PairInput],
    config: &AnalysisConfig,
    atr_period: usize,
) -> Result<Vec<PairEvaluation>, ConfigError> {
    evaluate_pairs(&order_by_volatility(inputs, atr_period), config)
}

/// Like [`evaluate_pairs`], adding each pair's model column.
///
/// Models are loaded through `cache` on first use; a pair whose model cannot
/// be loaded is evaluated on its detectors alone.
pub fn evaluate_pairs_with_models<M, F, E>(
    inputs: &[PairInput],
    config: &AnalysisConfig,
    cache: &mut ModelCache<M>,
    mut load: F,
) -> Result<Vec<PairEvaluation>, ConfigError>
where
    M: SignalModel,
    F: FnMut(&str) -> Result<M, E>,
    E: Display,
{
    config.validate()?;
    for input in inputs {
        cache.get_or_load(&input.pair, &mut load);
    }

    let cache = &*cache;
    let results = inputs
        .par_iter()
        .map(|input| {
            let engine = SignalEngine::new(config)?;
            let trend = input.trend_candles();
            Ok(match cache.get(&input.pair) {
                Some(model) => engine.evaluate_with_model(&input.pair, &input.series, trend, model),
                None => engine.evaluate(&input.pair, &input.series, trend),
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;
    log_summary(&results);
    Ok(results)
}

fn log_summary(results: &[PairEvaluation]) {
    let signalled = results.iter().filter(|r| !r.direction().is_flat()).count();
    info!(pairs = results.len(), signalled, "pairs evaluated");
}
