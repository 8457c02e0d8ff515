//! Backtest artifact export: full result as JSON, trade tape as CSV.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::backtest::{BacktestResult, ExitReason, TradeRecord};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize result: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write trade CSV: {0}")]
    Csv(#[from] csv::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub fn write_result_json(path: &Path, result: &BacktestResult) -> Result<(), ArtifactError> {
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json).map_err(io_error(path))
}

pub fn write_trades_csv(path: &Path, trades: &[TradeRecord]) -> Result<(), ArtifactError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "pair",
        "direction",
        "entry_time",
        "exit_time",
        "entry_price",
        "exit_price",
        "quantity",
        "stop_loss",
        "take_profit",
        "exit_reason",
        "net_pnl",
        "return_pct",
    ])?;
    for t in trades {
        let reason = match t.exit_reason {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::EndOfData => "end_of_data",
        };
        writer.write_record([
            t.pair.clone(),
            t.direction.to_string(),
            t.entry_time.to_string(),
            t.exit_time.to_string(),
            format!("{:.6}", t.entry_price),
            format!("{:.6}", t.exit_price),
            format!("{:.4}", t.quantity),
            format!("{:.6}", t.stop_loss),
            format!("{:.6}", t.take_profit),
            reason.to_string(),
            format!("{:.4}", t.net_pnl),
            format!("{:.6}", t.return_pct),
        ])?;
    }
    writer.flush().map_err(io_error(path))
}

/// Write `result.json` and `trades.csv` into `dir`, creating it if needed.
pub fn write_artifacts(dir: &Path, result: &BacktestResult) -> Result<(), ArtifactError> {
    fs::create_dir_all(dir).map_err(io_error(dir))?;
    write_result_json(&dir.join("result.json"), result)?;
    write_trades_csv(&dir.join("trades.csv"), &result.report.trades)?;
    info!(dir = %dir.display(), trades = result.report.trades.len(), "artifacts written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{run_backtest, BacktestOptions};
    use crate::synthetic::synthetic_candles;
    use confluence_core::AnalysisConfig;

    fn result() -> BacktestResult {
        let series = synthetic_candles("EURUSD", 400, 3).unwrap();
        let mut config = AnalysisConfig::default();
        config.scoring.signal_threshold = 1.0;
        run_backtest(&series, None, &config, &BacktestOptions::default()).unwrap()
    }

    #[test]
    fn writes_json_and_trade_tape() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run");
        let result = result();
        write_artifacts(&out, &result).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("result.json")).unwrap()).unwrap();
        assert_eq!(json["pair"], "EURUSD");
        assert_eq!(json["config_fingerprint"], result.config_fingerprint.as_str());
        assert_eq!(
            json["trades"].as_array().map(Vec::len),
            Some(result.report.trades.len())
        );
        assert!(json["metrics"]["sharpe"].is_number());

        let mut reader = csv::Reader::from_path(out.join("trades.csv")).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "pair");
        assert_eq!(reader.records().count(), result.report.trades.len());
    }

    #[test]
    fn unwritable_path_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir").join("result.json");
        assert!(matches!(
            write_result_json(&missing, &result()),
            Err(ArtifactError::Io { .. })
        ));
    }
}
