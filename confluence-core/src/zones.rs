//! Zone clustering: merges nearby price levels into contiguous zones.

use serde::{Deserialize, Serialize};

use crate::domain::{Zone, ZoneKind};

/// Merges sorted price levels into non-overlapping zones.
///
/// A zone starts at its lowest level and absorbs every following level that
/// satisfies `level <= start * (1 + threshold_pct)`. The first level past that
/// bound closes the zone at the previous level and opens a new one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneClusterer {
    pub threshold_pct: f64,
}

impl ZoneClusterer {
    pub fn new(threshold_pct: f64) -> Self {
        assert!(
            threshold_pct >= 0.0 && threshold_pct.is_finite(),
            "zone threshold_pct must be finite and >= 0"
        );
        Self { threshold_pct }
    }

    pub fn cluster(&self, levels: &[f64], kind: ZoneKind) -> Vec<Zone> {
        cluster_levels(levels, self.threshold_pct, kind)
    }
}

impl Default for ZoneClusterer {
    fn default() -> Self {
        Self::new(0.002)
    }
}

/// Single linear pass over the sorted levels. NaN levels are ignored and
/// empty input yields no zones.
pub fn cluster_levels(levels: &[f64], threshold_pct: f64, kind: ZoneKind) -> Vec<Zone> {
    let mut sorted: Vec<f64> = levels.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);

    let Some((&first, rest)) = sorted.split_first() else {
        return Vec::new();
    };

    let mut zones = Vec::new();
    let mut start = first;
    let mut end = first;
    for &level in rest {
        if level > start * (1.0 + threshold_pct) {
            zones.push(Zone::new(start, end, kind));
            start = level;
        }
        end = level;
    }
    zones.push(Zone::new(start, end, kind));
    zones
}
