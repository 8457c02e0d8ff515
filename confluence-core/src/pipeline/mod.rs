//! DetectorPipeline: fans a candle series out to every enabled detector and
//! collects their columns into one [`AnalysisFrame`].
//!
//! Detectors run concurrently on the rayon pool. Their outputs are collected
//! first and inserted in configured order, so the frame is identical no matter
//! how the pool schedules them. A detector that errors, panics, or returns a
//! malformed output is logged and skipped; the rest of the run continues.

pub mod frame;

pub use frame::{AnalysisFrame, FrameError};

use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::detectors::{create_detector, Detector, DetectorConfig, DetectorOutput, FactoryError};
use crate::domain::{Candle, CandleSeries, Signal};

/// How signal columns are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// One pass over the whole series; votes may use later candles.
    #[default]
    Retrospective,
    /// Each vote uses only candles up to and including its own index.
    Causal,
}

pub struct DetectorPipeline {
    detectors: Vec<Box<dyn Detector>>,
    mode: EvaluationMode,
}

impl std::fmt::Debug for DetectorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorPipeline")
            .field("detectors", &self.names())
            .field("mode", &self.mode)
            .finish()
    }
}

impl DetectorPipeline {
    pub fn new(detectors: Vec<Box<dyn Detector>>, mode: EvaluationMode) -> Self {
        Self { detectors, mode }
    }

    /// Build every configured detector through the registry.
    pub fn from_configs(
        configs: &[DetectorConfig],
        mode: EvaluationMode,
    ) -> Result<Self, FactoryError> {
        let detectors = configs
            .iter()
            .map(create_detector)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(detectors, mode))
    }

    pub fn names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn run(&self, series: &CandleSeries) -> AnalysisFrame {
        match self.mode {
            EvaluationMode::Retrospective => self.run_retrospective(series),
            EvaluationMode::Causal => self.run_causal(series, 0),
        }
    }

    /// Label the whole series with one `analyze` call per detector.
    pub fn run_retrospective(&self, series: &CandleSeries) -> AnalysisFrame {
        let candles = series.candles();
        let outputs: Vec<Result<DetectorOutput, String>> = self
            .detectors
            .par_iter()
            .map(|detector| analyze_guarded(detector.as_ref(), candles))
            .collect();
        self.assemble(series, outputs)
    }

    /// Derive each vote at index `>= from` from the prefix ending at that
    /// index. Earlier indices are neutral. Zone and level columns still come
    /// from a full-series pass.
    pub fn run_causal(&self, series: &CandleSeries, from: usize) -> AnalysisFrame {
        let candles = series.candles();
        let outputs: Vec<Result<DetectorOutput, String>> = self
            .detectors
            .par_iter()
            .map(|detector| {
                let mut output = analyze_guarded(detector.as_ref(), candles)?;
                output.signals = causal_signals(detector.as_ref(), candles, from)?;
                Ok(output)
            })
            .collect();
        self.assemble(series, outputs)
    }

    fn assemble(
        &self,
        series: &CandleSeries,
        outputs: Vec<Result<DetectorOutput, String>>,
    ) -> AnalysisFrame {
        let mut frame = AnalysisFrame::new(series.clone());

        for (detector, output) in self.detectors.iter().zip(outputs) {
            let name = detector.name();
            let output = match output {
                Ok(output) => output,
                Err(reason) => {
                    warn!(detector = name, %reason, "detector failed, skipping");
                    frame.mark_failed(name);
                    continue;
                }
            };

            let active = output.active_count();
            if let Err(e) = frame.insert_signal(name, output.signals) {
                warn!(detector = name, error = %e, "rejected detector output, skipping");
                frame.mark_failed(name);
                continue;
            }
            for (key, zones) in output.zones {
                debug!(detector = name, column = %key, zones = zones.len(), "zones identified");
                if let Err(e) = frame.insert_zones(&key, zones) {
                    warn!(detector = name, error = %e, "zone column dropped");
                }
            }
            for (key, values) in output.levels {
                if let Err(e) = frame.insert_level(&key, values) {
                    warn!(detector = name, error = %e, "level column dropped");
                }
            }
            debug!(detector = name, active, "detector finished");
        }
        frame
    }
}

/// `analyze` with panics and malformed outputs turned into errors.
fn analyze_guarded(detector: &dyn Detector, candles: &[Candle]) -> Result<DetectorOutput, String> {
    let output = catch_unwind(AssertUnwindSafe(|| detector.analyze(candles)))
        .map_err(panic_message)?
        .map_err(|e| e.to_string())?;
    if output.signals.len() != candles.len() {
        return Err(format!(
            "produced {} signals for {} candles",
            output.signals.len(),
            candles.len()
        ));
    }
    Ok(output)
}

fn causal_signals(detector: &dyn Detector, candles: &[Candle], from: usize) -> Result<Vec<Signal>, String> {
    let n = candles.len();
    let start = from.min(n);
    let tail = catch_unwind(AssertUnwindSafe(|| {
        (start..n)
            .into_par_iter()
            .map(|i| detector.signal_at(candles, i))
            .collect::<Result<Vec<_>, _>>()
    }))
    .map_err(panic_message)?
    .map_err(|e| e.to_string())?;

    let mut signals = vec![Signal::Neutral; start];
    signals.extend(tail);
    Ok(signals)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
