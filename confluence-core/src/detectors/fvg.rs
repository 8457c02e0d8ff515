//! Fair-value gaps: three-candle price voids and their mitigation.
//!
//! A bullish gap sits between `high[m-1]` and `low[m+1]` when the latter is
//! higher; a bearish gap between `high[m+1]` and `low[m-1]` when the former is
//! lower. A gap stays active from the candle after its confirmation until
//! price returns to its far boundary (mitigation) or it ages out.
//!
//! Only the newest active gap of each side is exposed per candle, and votes
//! read that boundary: a candle whose low reaches the active bullish bottom
//! and closes bullish makes the next candle +1, mirrored for bearish. The
//! touch mitigates the gap, so each gap votes at most once; later returns to
//! the same price stay silent until a new gap forms.

use tracing::debug;

use crate::domain::{Bias, Candle, FairValueGap, Signal};

use super::{mark, Detector, DetectorError, DetectorOutput};

#[derive(Debug, Clone)]
pub struct FairValueGapDetector {
    /// Minimum gap width as a fraction of the middle candle's close.
    pub min_size_pct: f64,
    /// Candles after confirmation during which a gap may still be mitigated.
    pub max_age: Option<usize>,
}

impl FairValueGapDetector {
    pub fn new(min_size_pct: f64, max_age: Option<usize>) -> Self {
        assert!(min_size_pct >= 0.0, "min_size_pct must be >= 0");
        assert!(max_age.map_or(true, |a| a >= 1), "max_age must be >= 1");
        Self {
            min_size_pct,
            max_age,
        }
    }

    pub fn default_params() -> Self {
        Self::new(0.001, None)
    }

    /// Every gap wider than the minimum, with its lifecycle resolved against
    /// the candles that follow it.
    pub fn find_gaps(&self, candles: &[Candle]) -> Vec<FairValueGap> {
        let n = candles.len();
        let mut gaps = Vec::new();
        if n < 3 {
            return gaps;
        }

        for m in 1..n - 1 {
            let prev = &candles[m - 1];
            let next = &candles[m + 1];
            let min_width = self.min_size_pct * candles[m].close;

            if next.low > prev.high && next.low - prev.high > min_width {
                gaps.push(self.resolve(candles, m, prev.high, next.low, Bias::Bullish));
            }
            if next.high < prev.low && prev.low - next.high > min_width {
                gaps.push(self.resolve(candles, m, next.high, prev.low, Bias::Bearish));
            }
        }
        gaps
    }

    fn resolve(&self, candles: &[Candle], m: usize, lower: f64, upper: f64, bias: Bias) -> FairValueGap {
        let confirmed_at = m + 1;
        let last = candles.len() - 1;
        let horizon = self
            .max_age
            .map_or(last, |age| (confirmed_at + age).min(last));

        let mitigated_at = (confirmed_at + 1..=horizon).find(|&j| match bias {
            Bias::Bullish => candles[j].low <= lower,
            Bias::Bearish => candles[j].high >= upper,
        });
        let expired_at = match (mitigated_at, self.max_age) {
            (None, Some(age)) if confirmed_at + age < last => Some(confirmed_at + age),
            _ => None,
        };

        FairValueGap {
            lower,
            upper,
            bias,
            formed_at: m,
            confirmed_at,
            mitigated_at,
            expired_at,
        }
    }
}

/// Per candle, the boundary of the most recently confirmed gap of `bias` that
/// is still active there (bottom for bullish, top for bearish).
fn active_boundary(gaps: &[FairValueGap], bias: Bias, len: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; len];
    let mut pending = gaps.iter().filter(|g| g.bias == bias).peekable();
    let mut stack: Vec<&FairValueGap> = Vec::new();

    for (i, slot) in out.iter_mut().enumerate() {
        while let Some(gap) = pending.next_if(|g| g.confirmed_at < i) {
            stack.push(gap);
        }
        // inactivity is permanent, so stale gaps can be dropped lazily
        while stack.last().is_some_and(|g| !g.is_active_at(i)) {
            stack.pop();
        }
        if let Some(gap) = stack.last() {
            *slot = match bias {
                Bias::Bullish => gap.lower,
                Bias::Bearish => gap.upper,
            };
        }
    }
    out
}

impl Detector for FairValueGapDetector {
    fn name(&self) -> &str {
        "fvg"
    }

    fn warmup_candles(&self) -> usize {
        3
    }

    fn analyze(&self, candles: &[Candle]) -> Result<DetectorOutput, DetectorError> {
        let n = candles.len();
        if n < self.warmup_candles() {
            return Ok(DetectorOutput::neutral(n));
        }

        let gaps = self.find_gaps(candles);
        debug!(gaps = gaps.len(), "fair value gaps identified");

        // votes read the same forward-filled boundary the level columns expose,
        // so only the newest active gap of each side can trigger
        let bull_bottom = active_boundary(&gaps, Bias::Bullish, n);
        let bear_top = active_boundary(&gaps, Bias::Bearish, n);
        let mut signals = vec![Signal::Neutral; n];
        for (j, c) in candles.iter().enumerate() {
            if c.is_bullish() && c.low <= bull_bottom[j] {
                mark(&mut signals, j + 1, Signal::Bullish);
            }
            if c.is_bearish() && c.high >= bear_top[j] {
                mark(&mut signals, j + 1, Signal::Bearish);
            }
        }

        let open_zones = gaps
            .iter()
            .filter(|g| g.is_open())
            .map(FairValueGap::zone)
            .collect();
        Ok(DetectorOutput {
            signals,
            ..DetectorOutput::default()
        }
        .with_zones("fvg_zones", open_zones)
        .with_level("active_bull_fvg_bottom", bull_bottom)
        .with_level("active_bear_fvg_top", bear_top))
    }
}
