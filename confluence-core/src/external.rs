//! External signal sources: pluggable predictors and their per-pair cache.
//!
//! A [`SignalModel`] contributes one more vote column under the same
//! `{-1, 0, +1}` contract as the detectors, so the scorer cannot tell the two
//! apart. Models are loaded lazily per pair through a [`ModelCache`] owned by
//! the caller for the duration of a run.

use std::collections::BTreeMap;
use std::fmt::Display;

use tracing::{debug, warn};

use crate::detectors::DetectorError;
use crate::domain::{Candle, Signal};

/// Default column name for model predictions.
pub const MODEL_COLUMN: &str = "ml_position";

/// A directional predictor over candle history.
///
/// `predict` may return fewer values than candles when the model needs a
/// warm-up window; the frame left-pads the missing head with neutral votes.
pub trait SignalModel: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, candles: &[Candle]) -> Result<Vec<Signal>, DetectorError>;
}

impl<T: SignalModel + ?Sized> SignalModel for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn predict(&self, candles: &[Candle]) -> Result<Vec<Signal>, DetectorError> {
        (**self).predict(candles)
    }
}

/// Per-pair lazily loaded models.
///
/// A failed load is remembered as absent so it is not retried within the same
/// cache lifetime. Dropping the cache releases every model.
#[derive(Debug)]
pub struct ModelCache<M> {
    entries: BTreeMap<String, Option<M>>,
}

impl<M> Default for ModelCache<M> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<M> ModelCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model for `pair`, calling `load` on first use only.
    pub fn get_or_load<F, E>(&mut self, pair: &str, load: F) -> Option<&M>
    where
        F: FnOnce(&str) -> Result<M, E>,
        E: Display,
    {
        if !self.entries.contains_key(pair) {
            let loaded = match load(pair) {
                Ok(model) => {
                    debug!(pair, "model loaded");
                    Some(model)
                }
                Err(e) => {
                    warn!(pair, error = %e, "model unavailable");
                    None
                }
            };
            self.entries.insert(pair.to_string(), loaded);
        }
        self.entries.get(pair).and_then(Option::as_ref)
    }

    /// Already-loaded model for `pair`; never triggers a load.
    pub fn get(&self, pair: &str) -> Option<&M> {
        self.entries.get(pair).and_then(Option::as_ref)
    }

    /// Whether a load was attempted for `pair`, successful or not.
    pub fn contains(&self, pair: &str) -> bool {
        self.entries.contains_key(pair)
    }

    /// Number of successfully loaded models.
    pub fn loaded(&self) -> usize {
        self.entries.values().filter(|m| m.is_some()).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
