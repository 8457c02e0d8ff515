//! Candle loading for the runner.
//!
//! CSV files carry one candle per row with a header naming the columns
//! `timestamp,open,high,low,close,volume` (any case, any order; `volume` may
//! be absent). Rows are sorted by timestamp before the series is validated,
//! so duplicates surface as a [`SeriesError`].

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use confluence_core::domain::{Candle, CandleSeries, SeriesError};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("line {line}: cannot parse timestamp '{value}'")]
    BadTimestamp { line: u64, value: String },

    #[error("line {line}: cannot parse {column} value '{value}'")]
    BadNumber {
        line: u64,
        column: &'static str,
        value: String,
    },

    #[error("no candles in '{0}'")]
    Empty(String),

    #[error(transparent)]
    Series(#[from] SeriesError),
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse an RFC 3339 timestamp (normalised to UTC), `YYYY-MM-DD HH:MM:SS`,
/// or a bare date (midnight).
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

struct Columns {
    timestamp: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let lower: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |names: &[&str]| lower.iter().position(|h| names.contains(&h.as_str()));
        Ok(Self {
            timestamp: find(&["timestamp", "time", "datetime", "date"])
                .ok_or(LoadError::MissingColumn("timestamp"))?,
            open: find(&["open"]).ok_or(LoadError::MissingColumn("open"))?,
            high: find(&["high"]).ok_or(LoadError::MissingColumn("high"))?,
            low: find(&["low"]).ok_or(LoadError::MissingColumn("low"))?,
            close: find(&["close"]).ok_or(LoadError::MissingColumn("close"))?,
            volume: find(&["volume", "tick_volume"]),
        })
    }
}

fn field<'r>(record: &'r csv::StringRecord, index: usize) -> &'r str {
    record.get(index).unwrap_or("").trim()
}

fn number(record: &csv::StringRecord, index: usize, column: &'static str) -> Result<f64, LoadError> {
    let raw = field(record, index);
    raw.parse::<f64>().map_err(|_| LoadError::BadNumber {
        line: record.position().map_or(0, |p| p.line()),
        column,
        value: raw.to_string(),
    })
}

/// Read candles for `symbol` from any CSV source.
pub fn read_candles<R: std::io::Read>(reader: R, symbol: &str) -> Result<CandleSeries, LoadError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut candles = Vec::new();
    for result in reader.records() {
        let record = result?;
        let raw_ts = field(&record, columns.timestamp);
        let timestamp = parse_timestamp(raw_ts).ok_or_else(|| LoadError::BadTimestamp {
            line: record.position().map_or(0, |p| p.line()),
            value: raw_ts.to_string(),
        })?;
        let volume = match columns.volume {
            Some(i) => number(&record, i, "volume")?,
            None => 0.0,
        };
        candles.push(Candle {
            timestamp,
            open: number(&record, columns.open, "open")?,
            high: number(&record, columns.high, "high")?,
            low: number(&record, columns.low, "low")?,
            close: number(&record, columns.close, "close")?,
            volume,
        });
    }

    if candles.is_empty() {
        return Err(LoadError::Empty(symbol.to_string()));
    }
    candles.sort_by_key(|c| c.timestamp);
    debug!(symbol, rows = candles.len(), has_volume = columns.volume.is_some(), "candles parsed");
    Ok(CandleSeries::new(symbol, candles)?)
}

/// Load candles for `symbol` from a CSV file.
pub fn load_candles_csv<P: AsRef<Path>>(path: P, symbol: &str) -> Result<CandleSeries, LoadError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    let series = read_candles(file, symbol)?;
    info!(symbol, path = %path.display(), candles = series.len(), "candles loaded");
    Ok(series)
}

/// BLAKE3 hash over every candle, identifying the dataset a result was
/// produced on.
pub fn dataset_hash(series: &CandleSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(series.symbol().as_bytes());
    for c in series.candles() {
        hasher.update(&c.timestamp.and_utc().timestamp().to_le_bytes());
        for v in [c.open, c.high, c.low, c.close, c.volume] {
            hasher.update(&v.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
