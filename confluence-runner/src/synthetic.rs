//! Seeded synthetic candles for development runs and tests.
//!
//! The walk alternates between up, down and ranging regimes with occasional
//! impulse candles, so every detector has swings, gaps and breaks to find.
//! Output is a pure function of `(symbol, n, seed)`.

use chrono::{Duration, NaiveDate};
use confluence_core::domain::{Candle, CandleSeries, SeriesError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn rng_for(symbol: &str, seed: u64) -> StdRng {
    let mut hasher = blake3::Hasher::new();
    hasher.update(symbol.as_bytes());
    hasher.update(&seed.to_le_bytes());
    StdRng::from_seed(*hasher.finalize().as_bytes())
}

/// `n` hourly candles starting 2024-01-01 00:00.
pub fn synthetic_candles(symbol: &str, n: usize, seed: u64) -> Result<CandleSeries, SeriesError> {
    let mut rng = rng_for(symbol, seed);
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();

    let mut candles = Vec::with_capacity(n);
    let mut close = 1.10_f64;
    let mut drift = 0.0_f64;
    let mut regime_left = 0usize;

    for i in 0..n {
        if regime_left == 0 {
            regime_left = rng.gen_range(40..160);
            drift = match rng.gen_range(0..3) {
                0 => 0.00025,
                1 => -0.00025,
                _ => 0.0,
            };
        }
        regime_left -= 1;

        let open = close;
        let mut step = drift + rng.gen_range(-0.0012..0.0012);
        let mut volume = rng.gen_range(800.0..3000.0);
        if rng.gen_bool(0.03) {
            // impulse candle
            step += drift.signum() * 0.002 + rng.gen_range(-0.003..0.003);
            volume *= 3.0;
        }
        close = (open * (1.0 + step)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.0008));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.0008));

        candles.push(Candle {
            timestamp: start + Duration::hours(i as i64),
            open,
            high,
            low,
            close,
            volume,
        });
    }
    CandleSeries::new(symbol, candles)
}

/// Aggregate every `factor` consecutive candles into one.
///
/// Each aggregate carries the timestamp of its last constituent, so a
/// lower-timeframe candle is only ever aligned with completed bars. A partial
/// trailing group is dropped.
pub fn resample(series: &CandleSeries, factor: usize) -> Result<CandleSeries, SeriesError> {
    let factor = factor.max(1);
    let candles = series
        .candles()
        .chunks_exact(factor)
        .filter_map(|group| {
            let first = group.first()?;
            let last = group.last()?;
            Some(Candle {
                timestamp: last.timestamp,
                open: first.open,
                high: group.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max),
                low: group.iter().map(|c| c.low).fold(f64::INFINITY, f64::min),
                close: last.close,
                volume: group.iter().map(|c| c.volume).sum(),
            })
        })
        .collect();
    CandleSeries::new(series.symbol(), candles)
}
