//! AnalysisFrame: a candle series plus the columns detectors wrote for it.
//!
//! Columns are write-once: a second write under an existing name is an error,
//! so no detector can overwrite another's output.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::{Candle, CandleSeries, Signal, Zone};
use crate::external::{SignalModel, MODEL_COLUMN};

#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("column '{0}' has already been written")]
    ColumnExists(String),

    #[error("column '{column}' has {actual} values for {expected} candles")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("model '{name}' failed: {reason}")]
    ModelFailed { name: String, reason: String },
}

/// Working table of one pipeline run.
#[derive(Debug, Clone)]
pub struct AnalysisFrame {
    series: CandleSeries,
    signals: BTreeMap<String, Vec<Signal>>,
    order: Vec<String>,
    zones: BTreeMap<String, Vec<Zone>>,
    levels: BTreeMap<String, Vec<f64>>,
    failed: Vec<String>,
}

impl AnalysisFrame {
    pub fn new(series: CandleSeries) -> Self {
        Self {
            series,
            signals: BTreeMap::new(),
            order: Vec::new(),
            zones: BTreeMap::new(),
            levels: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    pub fn series(&self) -> &CandleSeries {
        &self.series
    }

    pub fn candles(&self) -> &[Candle] {
        self.series.candles()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    // ─── Signal columns ──────────────────────────────────────────────

    pub fn insert_signal(&mut self, name: &str, column: Vec<Signal>) -> Result<(), FrameError> {
        if self.signals.contains_key(name) {
            return Err(FrameError::ColumnExists(name.to_string()));
        }
        self.check_len(name, column.len())?;
        self.signals.insert(name.to_string(), column);
        self.order.push(name.to_string());
        Ok(())
    }

    /// Vote of column `name` at `index`; neutral when either is missing.
    pub fn signal(&self, name: &str, index: usize) -> Signal {
        self.signals
            .get(name)
            .and_then(|col| col.get(index))
            .copied()
            .unwrap_or_default()
    }

    pub fn signal_column(&self, name: &str) -> Option<&[Signal]> {
        self.signals.get(name).map(Vec::as_slice)
    }

    /// Signal column names in insertion order.
    pub fn columns(&self) -> &[String] {
        &self.order
    }

    /// Every column's vote at `index`, in insertion order.
    pub fn signals_at(&self, index: usize) -> impl Iterator<Item = (&str, Signal)> + '_ {
        self.order
            .iter()
            .map(move |name| (name.as_str(), self.signal(name, index)))
    }

    /// Run a model over the series and store its votes as a signal column.
    ///
    /// Shorter outputs are left-padded with neutral votes; longer outputs are
    /// rejected.
    pub fn attach_model(
        &mut self,
        model: &dyn SignalModel,
        column: Option<&str>,
    ) -> Result<(), FrameError> {
        let name = column.unwrap_or(MODEL_COLUMN);
        let predicted = model
            .predict(self.series.candles())
            .map_err(|e| FrameError::ModelFailed {
                name: model.name().to_string(),
                reason: e.to_string(),
            })?;
        let n = self.len();
        if predicted.len() > n {
            return Err(FrameError::LengthMismatch {
                column: name.to_string(),
                expected: n,
                actual: predicted.len(),
            });
        }
        let mut padded = vec![Signal::Neutral; n - predicted.len()];
        padded.extend(predicted);
        self.insert_signal(name, padded)
    }

    // ─── Side columns ────────────────────────────────────────────────

    pub fn insert_zones(&mut self, key: &str, zones: Vec<Zone>) -> Result<(), FrameError> {
        if self.zones.contains_key(key) {
            return Err(FrameError::ColumnExists(key.to_string()));
        }
        self.zones.insert(key.to_string(), zones);
        Ok(())
    }

    pub fn insert_level(&mut self, key: &str, values: Vec<f64>) -> Result<(), FrameError> {
        if self.levels.contains_key(key) {
            return Err(FrameError::ColumnExists(key.to_string()));
        }
        self.check_len(key, values.len())?;
        self.levels.insert(key.to_string(), values);
        Ok(())
    }

    pub fn zones(&self, key: &str) -> &[Zone] {
        self.zones.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn zone_columns(&self) -> impl Iterator<Item = &str> {
        self.zones.keys().map(String::as_str)
    }

    pub fn level(&self, key: &str) -> Option<&[f64]> {
        self.levels.get(key).map(Vec::as_slice)
    }

    /// Level value at `index`, `None` when missing or NaN.
    pub fn level_at(&self, key: &str, index: usize) -> Option<f64> {
        self.levels
            .get(key)
            .and_then(|col| col.get(index))
            .copied()
            .filter(|v| !v.is_nan())
    }

    // ─── Failures ────────────────────────────────────────────────────

    pub fn mark_failed(&mut self, name: &str) {
        self.failed.push(name.to_string());
    }

    /// Detectors that were skipped during the run.
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    fn check_len(&self, column: &str, actual: usize) -> Result<(), FrameError> {
        let expected = self.len();
        if actual != expected {
            return Err(FrameError::LengthMismatch {
                column: column.to_string(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}
