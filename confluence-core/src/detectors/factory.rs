//! Detector registry: converts `DetectorConfig` into runtime trait objects.
//!
//! Parameters are numeric (`BTreeMap<String, f64>` for deterministic
//! serialization). Booleans are encoded as 0/1; optional parameters are simply
//! omitted. Values are range-checked here so constructor assertions never fire
//! on user-supplied configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    Detector, FairValueGapDetector, FibonacciConfluenceDetector, FibonacciRetracementDetector,
    MarketStructureShiftDetector, OrderBlockDetector, SmaCrossoverDetector,
    StructureBreakDetector, SupportResistanceDetector,
};

/// The default pipeline, in order.
pub const DETECTOR_KINDS: [&str; 6] = ["sr", "order_block", "fvg", "mss", "fibonacci", "bos_choch_ob"];

/// Kinds the registry builds on request only. They carry no default weight.
pub const OPTIONAL_DETECTOR_KINDS: [&str; 2] = ["sma_crossover", "fib_retracement"];

// ─── Config ──────────────────────────────────────────────────────────

/// One enabled detector and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
}

impl DetectorConfig {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }
}

/// All six detectors with their default parameters.
pub fn default_detector_configs() -> Vec<DetectorConfig> {
    DETECTOR_KINDS.iter().map(|kind| DetectorConfig::new(kind)).collect()
}

// ─── Error type ──────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FactoryError {
    #[error("Unknown detector type: {0}")]
    UnknownDetector(String),
    #[error("Invalid parameter {name}={value} for {kind}: {reason}")]
    InvalidParam {
        kind: String,
        name: String,
        value: f64,
        reason: &'static str,
    },
}

// ─── Helpers ─────────────────────────────────────────────────────────

fn invalid(config: &DetectorConfig, name: &str, value: f64, reason: &'static str) -> FactoryError {
    FactoryError::InvalidParam {
        kind: config.kind.clone(),
        name: name.to_string(),
        value,
        reason,
    }
}

/// Non-negative finite f64 parameter, falling back to `default`.
fn param(config: &DetectorConfig, name: &str, default: f64) -> Result<f64, FactoryError> {
    match config.params.get(name).copied() {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Some(v) => Err(invalid(config, name, v, "must be finite and >= 0")),
    }
}

/// Integer parameter of at least `min`, falling back to `default`.
fn param_usize(
    config: &DetectorConfig,
    name: &str,
    default: usize,
    min: usize,
) -> Result<usize, FactoryError> {
    match config.params.get(name).copied() {
        None => Ok(default),
        Some(v) if v.is_finite() && v >= min as f64 && v.fract() == 0.0 => Ok(v as usize),
        Some(v) => Err(invalid(config, name, v, "must be a whole number above the minimum")),
    }
}

fn param_bool(config: &DetectorConfig, name: &str, default: bool) -> bool {
    config.params.get(name).map_or(default, |&v| v != 0.0)
}

/// Optional parameter; absent or zero means `None`.
fn param_opt_usize(config: &DetectorConfig, name: &str, min: usize) -> Result<Option<usize>, FactoryError> {
    match config.params.get(name).copied() {
        None => Ok(None),
        Some(v) if v == 0.0 => Ok(None),
        Some(_) => param_usize(config, name, 0, min).map(Some),
    }
}

// ─── Detector factory ────────────────────────────────────────────────

/// Create a detector from a `DetectorConfig`.
pub fn create_detector(config: &DetectorConfig) -> Result<Box<dyn Detector>, FactoryError> {
    match config.kind.as_str() {
        "sr" => {
            let lookback_period = param_usize(config, "lookback_period", 90, 3)?;
            let peak_distance = param_usize(config, "peak_distance", 5, 1)?;
            let zone_threshold_pct = param(config, "zone_threshold_pct", 0.002)?;
            let touch_proximity_pct = param(config, "touch_proximity_pct", 0.001)?;
            Ok(Box::new(SupportResistanceDetector::new(
                lookback_period,
                peak_distance,
                zone_threshold_pct,
                touch_proximity_pct,
            )))
        }
        "order_block" => {
            let lookback = param_usize(config, "lookback", 75, 2)?;
            let breakout_candles = param_usize(config, "breakout_candles", 3, 1)?;
            Ok(Box::new(OrderBlockDetector::new(lookback, breakout_candles)))
        }
        "fvg" => {
            let min_size_pct = param(config, "min_size_pct", 0.001)?;
            let max_age = param_opt_usize(config, "max_age", 1)?;
            Ok(Box::new(FairValueGapDetector::new(min_size_pct, max_age)))
        }
        "mss" => {
            let lookback = param_usize(config, "lookback", 20, 1)?;
            let scan_limit = param_usize(config, "scan_limit", 200, lookback + 1)?;
            Ok(Box::new(MarketStructureShiftDetector::new(lookback, scan_limit)))
        }
        "fibonacci" => {
            let trend_period = param_usize(config, "trend_period", 10, 1)?;
            let volume_threshold = config
                .params
                .get("volume_threshold")
                .map(|_| param(config, "volume_threshold", 0.0))
                .transpose()?;
            let volume_return_window = param_usize(config, "volume_return_window", 20, 2)?;
            let volume_touch_pct = param(config, "volume_touch_pct", 0.002)?;
            let fib_touch_pct = param(config, "fib_touch_pct", 0.002)?;
            let scan_limit = match config.params.get("scan_limit") {
                None => Some(100),
                Some(_) => param_opt_usize(config, "scan_limit", 3)?,
            };
            Ok(Box::new(FibonacciConfluenceDetector::new(
                trend_period,
                volume_threshold,
                volume_return_window,
                volume_touch_pct,
                fib_touch_pct,
                scan_limit,
            )))
        }
        "bos_choch_ob" => {
            let swing = param_usize(config, "swing_detection_period", 5, 1)?;
            let close_only = param_bool(config, "use_close_only_for_break", true);
            let touch = param(config, "level_touch_threshold_pct", 0.001)?;
            let ob_return = param_usize(config, "ob_return_lookback", 20, 2)?;
            let on_break = param_bool(config, "bos_choch_momentum_confirmation", true);
            let on_return = param_bool(config, "ob_return_momentum_confirmation", true);
            Ok(Box::new(
                StructureBreakDetector::new(swing, close_only, touch, ob_return)
                    .with_momentum_confirmation(on_break, on_return),
            ))
        }
        "sma_crossover" => {
            let short = param_usize(config, "short_window", 20, 1)?;
            let long = param_usize(config, "long_window", 50, short + 1)?;
            Ok(Box::new(SmaCrossoverDetector::new(short, long)))
        }
        "fib_retracement" => {
            let lookback_period = param_usize(config, "lookback_period", 150, 2)?;
            let mut key_ratios = Vec::new();
            for (name, default) in [("ratio_a", 0.5), ("ratio_b", 0.618)] {
                let ratio = param(config, name, default)?;
                if ratio > 1.0 {
                    return Err(invalid(config, name, ratio, "must be within [0, 1]"));
                }
                key_ratios.push(ratio);
            }
            let touch_proximity_pct = param(config, "touch_proximity_pct", 0.001)?;
            Ok(Box::new(FibonacciRetracementDetector::new(
                lookback_period,
                key_ratios,
                touch_proximity_pct,
            )))
        }
        other => Err(FactoryError::UnknownDetector(other.to_string())),
    }
}
