//! Confluence Runner: drives the core over stored or synthetic candles.
//!
//! - [`data_loader`]: CSV candles and dataset hashing
//! - [`synthetic`]: seeded random-walk candles and timeframe resampling
//! - [`evaluate`]: many pairs evaluated in parallel
//! - [`selector`]: pairs ranked by daily ATR
//! - [`backtest`]: walk-forward simulation with stop/target exits
//! - [`sweep`]: grid search over scoring and risk parameters
//! - [`artifacts`]: result JSON and trade CSV export

pub mod artifacts;
pub mod backtest;
pub mod data_loader;
pub mod evaluate;
pub mod fitness;
pub mod metrics;
pub mod selector;
pub mod sweep;
pub mod synthetic;

pub use artifacts::{write_artifacts, write_result_json, write_trades_csv, ArtifactError};
pub use backtest::{
    run_backtest, simulate, BacktestError, BacktestOptions, BacktestReport, BacktestResult,
    ExitReason, FillPolicy, TradeRecord,
};
pub use data_loader::{dataset_hash, load_candles_csv, read_candles, LoadError};
pub use evaluate::{
    evaluate_pairs, evaluate_pairs_by_volatility, evaluate_pairs_with_models, PairInput,
};
pub use fitness::FitnessMetric;
pub use metrics::PerformanceMetrics;
pub use selector::{
    daily_bars, rank_pairs_by_volatility, PairVolatility, DEFAULT_SELECTOR_ATR_PERIOD,
};
pub use sweep::{run_sweep, SweepGrid, SweepOutcome, SweepPoint, SweepResults};
pub use synthetic::{resample, synthetic_candles};
