//! Support/resistance zones from clustered swing extremes.
//!
//! Local maxima of highs and minima of lows over the last `lookback_period`
//! candles are clustered into resistance and support zones. A candle whose
//! predecessor dipped into support and closed bullish votes +1; one whose
//! predecessor pushed into resistance and closed bearish votes -1.

use tracing::debug;

use crate::domain::{Candle, Signal, Zone, ZoneKind};
use crate::levels::{find_peaks, find_troughs};
use crate::zones::ZoneClusterer;

use super::{mark, Detector, DetectorError, DetectorOutput};

/// Support/resistance zone bounce detector.
#[derive(Debug, Clone)]
pub struct SupportResistanceDetector {
    pub lookback_period: usize,
    pub peak_distance: usize,
    pub zone_threshold_pct: f64,
    pub touch_proximity_pct: f64,
}

impl SupportResistanceDetector {
    pub fn new(
        lookback_period: usize,
        peak_distance: usize,
        zone_threshold_pct: f64,
        touch_proximity_pct: f64,
    ) -> Self {
        assert!(lookback_period >= 3, "lookback_period must be >= 3");
        assert!(peak_distance >= 1, "peak_distance must be >= 1");
        assert!(zone_threshold_pct >= 0.0, "zone_threshold_pct must be >= 0");
        assert!(touch_proximity_pct >= 0.0, "touch_proximity_pct must be >= 0");
        Self {
            lookback_period,
            peak_distance,
            zone_threshold_pct,
            touch_proximity_pct,
        }
    }

    pub fn default_params() -> Self {
        Self::new(90, 5, 0.002, 0.001)
    }

    /// `(support, resistance)` zones found in the tail window of `candles`.
    pub fn zones(&self, candles: &[Candle]) -> (Vec<Zone>, Vec<Zone>) {
        let start = candles.len().saturating_sub(self.lookback_period);
        let window = &candles[start..];

        let highs: Vec<f64> = window.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = window.iter().map(|c| c.low).collect();

        let resistance_levels = unique(find_peaks(&highs, self.peak_distance).iter().map(|&i| highs[i]));
        let support_levels = unique(find_troughs(&lows, self.peak_distance).iter().map(|&i| lows[i]));

        let clusterer = ZoneClusterer::new(self.zone_threshold_pct);
        (
            clusterer.cluster(&support_levels, ZoneKind::Support),
            clusterer.cluster(&resistance_levels, ZoneKind::Resistance),
        )
    }
}

fn unique(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.collect();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

impl Detector for SupportResistanceDetector {
    fn name(&self) -> &str {
        "sr"
    }

    fn warmup_candles(&self) -> usize {
        3
    }

    fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError> {
        let n = candles.len();
        if n < self.warmup_candles() {
            return Ok(DetectorOutput::neutral(n));
        }

        let (support, resistance) = self.zones(candles);
        debug!(
            support = support.len(),
            resistance = resistance.len(),
            "support/resistance zones identified"
        );

        let prox = self.touch_proximity_pct;
        let mut signals = vec![Signal::Neutral; n];
        for i in 1..n {
            let prev = &candles[i - 1];
            if prev.is_bullish() && support.iter().any(|z| prev.low <= z.upper * (1.0 + prox)) {
                mark(&mut signals, i, Signal::Bullish);
            }
            if prev.is_bearish() && resistance.iter().any(|z| prev.high >= z.lower * (1.0 - prox)) {
                mark(&mut signals, i, Signal::Bearish);
            }
        }

        Ok(DetectorOutput {
            signals,
            ..DetectorOutput::default()
        }
        .with_zones("support_zones", support)
        .with_zones("resistance_zones", resistance))
    }
}
