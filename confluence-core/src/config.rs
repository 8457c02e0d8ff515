//! Analysis configuration: enabled detectors, scoring, risk and trend settings.
//!
//! Loaded from TOML; every field has a default, so an empty file yields the
//! tuned default setup with all six detectors enabled.
//!
//! ```toml
//! mode = "causal"
//!
//! [scoring]
//! signal_threshold = 2.5
//!
//! [scoring.weights]
//! mss = 3.0
//!
//! [[detectors]]
//! kind = "fvg"
//! [detectors.params]
//! min_size_pct = 0.002
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detectors::{create_detector, default_detector_configs, DetectorConfig, FactoryError};
use crate::pipeline::EvaluationMode;
use crate::risk::RiskConfig;
use crate::scoring::{ScoringConfig, TrendFilterConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to encode config: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error("failed to serialize config for hashing: {0}")]
    Hash(#[from] serde_json::Error),

    #[error(transparent)]
    Detector(#[from] FactoryError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub detectors: Vec<DetectorConfig>,
    pub scoring: ScoringConfig,
    pub risk: RiskConfig,
    pub trend: TrendFilterConfig,
    pub mode: EvaluationMode,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            detectors: default_detector_configs(),
            scoring: ScoringConfig::default(),
            risk: RiskConfig::default(),
            trend: TrendFilterConfig::default(),
            mode: EvaluationMode::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for detector in &self.detectors {
            if !seen.insert(detector.kind.as_str()) {
                return Err(invalid(format!("detector '{}' listed twice", detector.kind)));
            }
            create_detector(detector)?;
        }

        let scoring = &self.scoring;
        for (column, weight) in &scoring.weights {
            if !(weight.is_finite() && *weight >= 0.0) {
                return Err(invalid(format!("weight for '{column}' must be >= 0, got {weight}")));
            }
        }
        if !(scoring.signal_threshold.is_finite() && scoring.signal_threshold >= 0.0) {
            return Err(invalid(format!(
                "signal_threshold must be >= 0, got {}",
                scoring.signal_threshold
            )));
        }
        if !(0.0..=1.0).contains(&scoring.trend_penalty_factor) {
            return Err(invalid(format!(
                "trend_penalty_factor must be in [0, 1], got {}",
                scoring.trend_penalty_factor
            )));
        }

        let risk = &self.risk;
        if !(risk.sl_atr_multiplier.is_finite() && risk.sl_atr_multiplier > 0.0) {
            return Err(invalid(format!(
                "sl_atr_multiplier must be > 0, got {}",
                risk.sl_atr_multiplier
            )));
        }
        if !(risk.risk_reward_ratio.is_finite() && risk.risk_reward_ratio > 0.0) {
            return Err(invalid(format!(
                "risk_reward_ratio must be > 0, got {}",
                risk.risk_reward_ratio
            )));
        }
        if risk.atr_period == 0 {
            return Err(invalid("atr_period must be >= 1".to_string()));
        }
        if let Some(capital) = risk.account_capital {
            if !(capital.is_finite() && capital > 0.0) {
                return Err(invalid(format!("account_capital must be > 0, got {capital}")));
            }
        }
        if let Some(pct) = risk.risk_per_trade_pct {
            if !(pct > 0.0 && pct < 1.0) {
                return Err(invalid(format!("risk_per_trade_pct must be in (0, 1), got {pct}")));
            }
        }

        if self.trend.period == 0 {
            return Err(invalid("trend period must be >= 1".to_string()));
        }
        Ok(())
    }

    /// BLAKE3 hex digest of the canonical JSON form.
    ///
    /// Maps are `BTreeMap`s, so equal configs always hash equal.
    pub fn fingerprint(&self) -> Result<String, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::Invalid(msg)
}
