//! Numeric indicator series used around the detectors.
//!
//! Indicators are pure functions: candle history in, numeric series out.
//! The first `lookback()` values are `f64::NAN` (warmup).

pub mod atr;
pub mod ema;
pub mod sma;

pub use atr::Atr;
pub use ema::Ema;
pub use sma::Sma;

use crate::domain::Candle;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No indicator value at candle t may depend on price data from candle t+1 or later.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_50", "atr_14").
    fn name(&self) -> &str;

    /// Number of candles needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire candle series.
    ///
    /// Returns a `Vec<f64>` of the same length as `candles`.
    fn compute(&self, candles: &[Candle]) -> Vec<f64>;
}

/// Create synthetic candles from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for the first candle),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<Candle> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle {
                timestamp: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
