//! Candle: the fundamental market data unit, and the validated series of them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use thiserror::Error;

/// OHLCV observation for one time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Close strictly above open. NaN prices never count as bullish.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Close strictly below open. NaN prices never count as bearish.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// Basic OHLC sanity check: high >= low and the body sits inside the range.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }

    /// True if this candle's [low, high] range intersects `[lower, upper]`.
    pub fn overlaps(&self, lower: f64, upper: f64) -> bool {
        self.low <= upper && self.high >= lower
    }
}

/// Errors raised when building a [`CandleSeries`].
#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("candle {index} has timestamp {timestamp} which does not follow {previous}")]
    NotIncreasing {
        index: usize,
        previous: NaiveDateTime,
        timestamp: NaiveDateTime,
    },

    #[error("candle {index} at {timestamp} has a non-finite OHLCV value")]
    NonFinite {
        index: usize,
        timestamp: NaiveDateTime,
    },
}

/// Ordered, timestamp-indexed candles for one instrument.
///
/// Timestamps are strictly increasing and every OHLCV value is finite. The
/// series dereferences to `&[Candle]`, which is what detectors consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries")]
pub struct CandleSeries {
    symbol: String,
    candles: Vec<Candle>,
}

/// Unchecked wire form; deserialization goes through [`CandleSeries::new`].
#[derive(Deserialize)]
struct RawSeries {
    symbol: String,
    candles: Vec<Candle>,
}

impl TryFrom<RawSeries> for CandleSeries {
    type Error = SeriesError;

    fn try_from(raw: RawSeries) -> Result<Self, Self::Error> {
        CandleSeries::new(raw.symbol, raw.candles)
    }
}

impl CandleSeries {
    pub fn new(symbol: impl Into<String>, candles: Vec<Candle>) -> Result<Self, SeriesError> {
        for (index, candle) in candles.iter().enumerate() {
            if candle.is_void() {
                return Err(SeriesError::NonFinite {
                    index,
                    timestamp: candle.timestamp,
                });
            }
            if index > 0 {
                let previous = candles[index - 1].timestamp;
                if candle.timestamp <= previous {
                    return Err(SeriesError::NotIncreasing {
                        index,
                        previous,
                        timestamp: candle.timestamp,
                    });
                }
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            candles,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// First `len` candles (clamped to the series length).
    pub fn prefix(&self, len: usize) -> &[Candle] {
        &self.candles[..len.min(self.candles.len())]
    }

    /// Last `n` candles (clamped to the series length).
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn into_candles(self) -> Vec<Candle> {
        self.candles
    }
}

impl Deref for CandleSeries {
    type Target = [Candle];

    fn deref(&self) -> &Self::Target {
        &self.candles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn ts(hour: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(hour)
    }

    fn sample_candle(hour: i64) -> Candle {
        Candle {
            timestamp: ts(hour),
            open: 1.1000,
            high: 1.1050,
            low: 1.0980,
            close: 1.1030,
            volume: 500.0,
        }
    }

    #[test]
    fn candle_direction() {
        let mut c = sample_candle(0);
        assert!(c.is_bullish());
        assert!(!c.is_bearish());
        c.close = 1.0990;
        assert!(c.is_bearish());
        c.close = f64::NAN;
        assert!(!c.is_bullish());
        assert!(!c.is_bearish());
    }

    #[test]
    fn candle_sanity() {
        assert!(sample_candle(0).is_sane());
        let mut c = sample_candle(0);
        c.high = 1.0900;
        assert!(!c.is_sane());
    }

    #[test]
    fn overlap_is_inclusive() {
        let c = sample_candle(0);
        assert!(c.overlaps(1.1050, 1.1100));
        assert!(c.overlaps(1.0900, 1.0980));
        assert!(!c.overlaps(1.1051, 1.1100));
    }

    #[test]
    fn series_accepts_increasing_timestamps() {
        let series = CandleSeries::new("EURUSD", vec![sample_candle(0), sample_candle(1)]).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.symbol(), "EURUSD");
        assert_eq!(series.prefix(1).len(), 1);
        assert_eq!(series.tail(5).len(), 2);
    }

    #[test]
    fn series_rejects_duplicate_timestamp() {
        let err = CandleSeries::new("EURUSD", vec![sample_candle(1), sample_candle(1)]).unwrap_err();
        assert!(matches!(err, SeriesError::NotIncreasing { index: 1, .. }));
    }

    #[test]
    fn series_rejects_non_finite() {
        let mut bad = sample_candle(1);
        bad.volume = f64::INFINITY;
        let err = CandleSeries::new("EURUSD", vec![sample_candle(0), bad]).unwrap_err();
        assert!(matches!(err, SeriesError::NonFinite { index: 1, .. }));
    }

    #[test]
    fn deserializing_validates_order() {
        let series = CandleSeries::new("EURUSD", vec![sample_candle(0), sample_candle(1)]).unwrap();
        let json = serde_json::to_string(&series).unwrap();
        let back: CandleSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(back, series);

        let unordered = serde_json::json!({
            "symbol": "EURUSD",
            "candles": [sample_candle(1), sample_candle(0)],
        });
        let err = serde_json::from_value::<CandleSeries>(unordered).unwrap_err();
        assert!(err.to_string().contains("does not follow"));
    }
}
