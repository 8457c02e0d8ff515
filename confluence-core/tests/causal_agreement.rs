//! Causal versus retrospective evaluation.
//!
//! Invariant: wherever a detector's retrospective vote at candle t depends only
//! on candles 0..=t, re-deriving it from the prefix ending at t must give the
//! same vote. FVG, MSS (series no longer than its scan window) and Fibonacci
//! (fixed volume threshold, unlimited scan) are in that class. S/R, order
//! blocks and BOS/CHOCH retests label candles using later data and are only
//! checked for shape.

use chrono::{Duration, NaiveDate};
use confluence_core::detectors::{
    Detector, FairValueGapDetector, FibonacciConfluenceDetector, MarketStructureShiftDetector,
};
use confluence_core::domain::{Candle, CandleSeries, Signal};
use confluence_core::pipeline::{DetectorPipeline, EvaluationMode};
use confluence_core::AnalysisConfig;

/// Seeded random walk around 1.10 with uneven wicks and volume.
fn walk(n: usize, seed: u64) -> Vec<Candle> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut state = seed;
    let mut unit = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as f64 / (1u64 << 31) as f64
    };

    let mut close = 1.10;
    (0..n)
        .map(|i| {
            let open = close;
            close = (open + (unit() - 0.5) * 0.004).max(0.5);
            let high = open.max(close) + unit() * 0.0015;
            let low = open.min(close) - unit() * 0.0015;
            Candle {
                timestamp: base + Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0 + unit() * 9000.0,
            }
        })
        .collect()
}

fn series(n: usize, seed: u64) -> CandleSeries {
    CandleSeries::new("TEST", walk(n, seed)).unwrap()
}

fn causal_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(FairValueGapDetector::new(0.0005, None)),
        Box::new(FairValueGapDetector::new(0.0005, Some(10))),
        Box::new(MarketStructureShiftDetector::new(8, 500)),
        Box::new(FibonacciConfluenceDetector::new(10, Some(8000.0), 20, 0.002, 0.002, None)),
    ]
}

#[test]
fn causal_and_retrospective_agree_for_past_only_detectors() {
    for seed in [1, 7, 42, 1234] {
        let s = series(220, seed);
        for detector in causal_detectors() {
            let retro = detector.analyze(&s).unwrap().signals;
            for (t, expected) in retro.iter().enumerate() {
                let causal = detector.signal_at(&s, t).unwrap();
                assert_eq!(
                    causal,
                    *expected,
                    "{} disagrees at candle {t} (seed {seed})",
                    detector.name()
                );
            }
        }
    }
}

#[test]
fn pipeline_modes_agree_for_past_only_detectors() {
    let s = series(160, 99);
    let retro = DetectorPipeline::new(causal_detectors(), EvaluationMode::Retrospective).run(&s);
    let causal = DetectorPipeline::new(causal_detectors(), EvaluationMode::Causal).run(&s);
    // the second FVG instance shares the first one's column name and is skipped
    assert_eq!(retro.failed(), &["fvg"]);
    assert_eq!(causal.failed(), &["fvg"]);
    for name in ["fvg", "mss", "fibonacci"] {
        assert_eq!(
            retro.signal_column(name).unwrap(),
            causal.signal_column(name).unwrap(),
            "{name} column differs between modes"
        );
    }
}

#[test]
fn truncation_never_rewrites_past_votes() {
    let full = walk(200, 5);
    for detector in causal_detectors() {
        let full_out = detector.analyze(&full).unwrap().signals;
        for cut in [50, 120, 199] {
            let truncated = detector.analyze(&full[..cut]).unwrap().signals;
            assert_eq!(
                &truncated[..],
                &full_out[..cut],
                "{} changed past votes when truncated at {cut}",
                detector.name()
            );
        }
    }
}

#[test]
fn sweep_then_break_fires_in_both_modes() {
    let rows = [
        (1.00, 1.001, 0.999, 1.00),
        (1.00, 1.001, 0.999, 1.00),
        (1.00, 1.02, 0.99, 1.00),
        (1.00, 1.001, 0.999, 1.00),
        (1.00, 1.001, 0.999, 1.00),
        (1.00, 1.001, 0.999, 1.00),
        (1.00, 1.005, 0.97, 0.975),
        (0.975, 1.00, 0.97, 0.99),
        (0.99, 1.01, 0.985, 1.005),
        (1.005, 1.03, 1.00, 1.025),
        (1.025, 1.028, 1.015, 1.02),
    ];
    let base = NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let candles: Vec<Candle> = rows
        .iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Candle {
            timestamp: base + Duration::hours(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        })
        .collect();
    let s = CandleSeries::new("SWEEP", candles).unwrap();
    let detector: Box<dyn Detector> = Box::new(MarketStructureShiftDetector::new(5, 200));
    let pipeline = DetectorPipeline::new(vec![detector], EvaluationMode::Causal);

    let causal = pipeline.run(&s);
    let retro = pipeline.run_retrospective(&s);
    let expected: Vec<Signal> = (0..11)
        .map(|i| if i == 9 { Signal::Bullish } else { Signal::Neutral })
        .collect();
    assert_eq!(causal.signal_column("mss").unwrap(), &expected[..]);
    assert_eq!(retro.signal_column("mss").unwrap(), &expected[..]);
}

#[test]
fn causal_default_pipeline_keeps_shape_and_side_columns() {
    let s = series(150, 3);
    let config = AnalysisConfig::default();
    let retro = DetectorPipeline::from_configs(&config.detectors, EvaluationMode::Retrospective)
        .unwrap()
        .run(&s);
    let causal = DetectorPipeline::from_configs(&config.detectors, EvaluationMode::Causal)
        .unwrap()
        .run(&s);

    assert_eq!(retro.columns(), causal.columns());
    for name in causal.columns() {
        assert_eq!(causal.signal_column(name).unwrap().len(), s.len());
    }
    for key in ["support_zones", "resistance_zones", "ob_zones", "fvg_zones"] {
        assert_eq!(retro.zones(key), causal.zones(key), "{key} differs");
    }
    assert!(causal.failed().is_empty());
}
