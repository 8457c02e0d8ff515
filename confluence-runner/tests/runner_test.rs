//! Runner integration tests on seeded synthetic data: loading, multi-pair
//! evaluation, backtest accounting and sweep ranking.

use confluence_core::detectors::DetectorError;
use confluence_core::domain::{Candle, CandleSeries, Direction, Signal};
use confluence_core::external::MODEL_COLUMN;
use confluence_core::{AnalysisConfig, EvaluationMode, ModelCache, SignalEngine, SignalModel};
use confluence_runner::{
    evaluate_pairs, evaluate_pairs_with_models, load_candles_csv, resample, run_backtest,
    run_sweep, synthetic_candles, BacktestError, BacktestOptions, ExitReason, FitnessMetric,
    PairInput, SweepGrid,
};

fn eager_config() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.scoring.signal_threshold = 1.0;
    config
}

fn inputs() -> Vec<PairInput> {
    ["EURUSD", "GBPUSD", "USDJPY"]
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            let series = synthetic_candles(pair, 300, i as u64).unwrap();
            let trend = resample(&series, 4).unwrap();
            PairInput::new(series).with_trend(trend)
        })
        .collect()
}

// ── 1. Loading ──────────────────────────────────────────────────────

#[test]
fn csv_round_trip_preserves_candles() {
    let series = synthetic_candles("EURUSD", 120, 9).unwrap();
    let file = tempfile::NamedTempFile::new().unwrap();
    {
        let mut writer = csv::Writer::from_path(file.path()).unwrap();
        writer
            .write_record(["timestamp", "open", "high", "low", "close", "volume"])
            .unwrap();
        for c in series.iter() {
            writer
                .write_record([
                    c.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    c.open.to_string(),
                    c.high.to_string(),
                    c.low.to_string(),
                    c.close.to_string(),
                    c.volume.to_string(),
                ])
                .unwrap();
        }
        writer.flush().unwrap();
    }
    let loaded = load_candles_csv(file.path(), "EURUSD").unwrap();
    assert_eq!(loaded, series);
}

// ── 2. Multi-pair evaluation ────────────────────────────────────────

#[test]
fn pairs_keep_input_order_and_match_single_engine() {
    let inputs = inputs();
    let config = AnalysisConfig::default();
    let results = evaluate_pairs(&inputs, &config).unwrap();
    assert_eq!(results.len(), 3);

    let engine = SignalEngine::new(&config).unwrap();
    for (input, result) in inputs.iter().zip(&results) {
        assert_eq!(result.pair, input.pair);
        let single = engine.evaluate(
            &input.pair,
            &input.series,
            input.trend.as_ref().map(CandleSeries::candles),
        );
        assert_eq!(result.decision, single.decision);
    }
}

#[test]
fn invalid_config_is_rejected_before_any_work() {
    let mut config = AnalysisConfig::default();
    config.risk.sl_atr_multiplier = 0.0;
    assert!(evaluate_pairs(&inputs(), &config).is_err());
}

struct Fixed(Signal);

impl SignalModel for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    fn predict(&self, candles: &[Candle]) -> Result<Vec<Signal>, DetectorError> {
        Ok(vec![self.0; candles.len().saturating_sub(10)])
    }
}

#[test]
fn models_load_once_and_missing_models_fall_back() {
    let inputs = inputs();
    let mut config = AnalysisConfig::default();
    config.scoring.weights.insert(MODEL_COLUMN.to_string(), 10.0);

    let mut cache: ModelCache<Fixed> = ModelCache::new();
    let mut calls = 0;
    let mut loader = |pair: &str| {
        calls += 1;
        if pair == "GBPUSD" {
            Err("no model for pair")
        } else {
            Ok(Fixed(Signal::Bullish))
        }
    };

    let results = evaluate_pairs_with_models(&inputs, &config, &mut cache, &mut loader).unwrap();
    assert_eq!(cache.loaded(), 2);
    assert!(cache.contains("GBPUSD"));

    let eurusd = &results[0];
    let column = eurusd.frame().signal_column(MODEL_COLUMN).unwrap();
    assert_eq!(column.len(), 300);
    assert!(column[..10].iter().all(|s| s.is_neutral()));
    assert_eq!(column[299], Signal::Bullish);
    assert!(eurusd.decision.as_ref().unwrap().evaluation.raw.buy_score >= 10.0);
    assert!(results[1].frame().signal_column(MODEL_COLUMN).is_none());

    evaluate_pairs_with_models(&inputs, &config, &mut cache, &mut loader).unwrap();
    assert_eq!(calls, 3);
}

// ── 3. Backtest ─────────────────────────────────────────────────────

#[test]
fn backtest_accounting_is_consistent() {
    let series = synthetic_candles("EURUSD", 600, 11).unwrap();
    let config = eager_config();
    let options = BacktestOptions::default();
    let result = run_backtest(&series, None, &config, &options).unwrap();
    let report = &result.report;

    assert_eq!(result.pair, "EURUSD");
    assert_eq!(result.config_fingerprint, config.fingerprint().unwrap());
    assert_eq!(result.dataset_hash, confluence_runner::dataset_hash(&series));
    assert_eq!(report.equity_curve.len(), series.len());
    assert!(!report.trades.is_empty());
    assert_eq!(report.metrics.trade_count, report.trades.len());

    for pair in report.trades.windows(2) {
        assert!(pair[0].exit_index <= pair[1].entry_index, "positions overlap");
    }
    for t in &report.trades {
        assert!(t.entry_index < t.exit_index);
        assert!(t.commission > 0.0);
        assert!((t.net_pnl - (t.gross_pnl - t.commission)).abs() < 1e-6);
        assert_eq!(t.entry_price, series[t.entry_index].close);
        match t.exit_reason {
            ExitReason::StopLoss => {
                assert!(t.direction.sign() * (t.exit_price - t.entry_price) < 0.0);
            }
            ExitReason::TakeProfit => {
                assert!(t.direction.sign() * (t.exit_price - t.entry_price) > 0.0);
            }
            ExitReason::EndOfData => assert_eq!(t.exit_index, series.len() - 1),
        }
        assert_ne!(t.direction, Direction::Flat);
    }

    let net: f64 = report.trades.iter().map(|t| t.net_pnl).sum();
    assert!((report.metrics.final_equity - (options.initial_capital + net)).abs() < 1e-4);
    assert!(report.metrics.max_drawdown <= 0.0);
    assert!((0.0..=1.0).contains(&report.metrics.win_rate));
}

#[test]
fn causal_backtest_runs_and_is_deterministic() {
    let series = synthetic_candles("GBPUSD", 200, 4).unwrap();
    let trend = resample(&series, 4).unwrap();
    let config = AnalysisConfig {
        mode: EvaluationMode::Causal,
        ..eager_config()
    };
    let options = BacktestOptions::default();
    let a = run_backtest(&series, Some(&trend), &config, &options).unwrap();
    let b = run_backtest(&series, Some(&trend), &config, &options).unwrap();
    assert_eq!(a.mode, EvaluationMode::Causal);
    assert_eq!(a.report, b.report);
}

#[test]
fn backtest_rejects_empty_series_and_bad_options() {
    let empty = CandleSeries::new("EMPTY", Vec::new()).unwrap();
    let config = AnalysisConfig::default();
    assert!(matches!(
        run_backtest(&empty, None, &config, &BacktestOptions::default()),
        Err(BacktestError::EmptySeries(_))
    ));

    let series = synthetic_candles("EURUSD", 50, 1).unwrap();
    let options = BacktestOptions {
        initial_capital: -1.0,
        ..BacktestOptions::default()
    };
    assert!(matches!(
        run_backtest(&series, None, &config, &options),
        Err(BacktestError::InvalidOptions(_))
    ));
}

// ── 4. Sweep ────────────────────────────────────────────────────────

#[test]
fn sweep_ranks_points_and_best_replays_exactly() {
    let series = synthetic_candles("EURUSD", 500, 21).unwrap();
    let base = AnalysisConfig::default();
    let grid = SweepGrid {
        thresholds: vec![1.0, 2.0, 3.0],
        sl_multipliers: vec![1.0, 2.0],
        ..SweepGrid::default()
    };
    let options = BacktestOptions::default();
    let results =
        run_sweep(&series, None, &base, &grid, &options, FitnessMetric::TotalReturn).unwrap();

    assert_eq!(results.len(), 6);
    assert_eq!(results.metric, FitnessMetric::TotalReturn);
    for pair in results.all().windows(2) {
        assert!(pair[0].fitness >= pair[1].fitness);
    }
    let mut indices: Vec<usize> = results.all().iter().map(|o| o.index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..6).collect::<Vec<_>>());
    assert_eq!(results.top_n(2).len(), 2);
    assert_eq!(results.top_n(99).len(), 6);

    let best = results.best().unwrap();
    assert_eq!(best.fitness, best.metrics.total_return);
    let replay = run_backtest(&series, None, &best.point.apply(&base), &options).unwrap();
    assert_eq!(replay.report.metrics, best.metrics);
}

#[test]
fn sweep_rejects_invalid_grid() {
    let series = synthetic_candles("EURUSD", 100, 2).unwrap();
    let grid = SweepGrid {
        penalties: vec![-0.5],
        ..SweepGrid::default()
    };
    let result = run_sweep(
        &series,
        None,
        &AnalysisConfig::default(),
        &grid,
        &BacktestOptions::default(),
        FitnessMetric::Sharpe,
    );
    assert!(matches!(result, Err(BacktestError::InvalidGrid(_))));
}
