//! Confluence Core: structural pattern detectors, confluence scoring, trend
//! filter and ATR risk planning over OHLCV candles.
//!
//! Data flows one way:
//! candles → [`pipeline::DetectorPipeline`] (one vote column per detector,
//! plus zone/level side columns) → [`scoring::ConfluenceScorer`] (weighted
//! votes, trend penalty, threshold) → [`risk::RiskPlanner`] (stop, target,
//! size). [`engine::SignalEngine`] wires the stages for one pair.
//!
//! The crate performs no network or disk I/O apart from loading its own
//! TOML configuration.

pub mod config;
pub mod detectors;
pub mod domain;
pub mod engine;
pub mod external;
pub mod indicators;
pub mod levels;
pub mod pipeline;
pub mod risk;
pub mod scoring;
pub mod zones;

pub use config::{AnalysisConfig, ConfigError};
pub use detectors::{Detector, DetectorConfig, DetectorError, DetectorOutput};
pub use domain::{Candle, CandleSeries, Direction, Signal, TradePlan, Zone};
pub use engine::{Analysis, Decision, PairEvaluation, SignalEngine};
pub use external::{ModelCache, SignalModel};
pub use pipeline::{AnalysisFrame, DetectorPipeline, EvaluationMode};
pub use risk::{PlanError, RiskConfig, RiskPlanner};
pub use scoring::{ConfluenceScorer, ScoreEvaluation, ScoringConfig, TrendFilter, TrendState};
pub use zones::ZoneClusterer;
