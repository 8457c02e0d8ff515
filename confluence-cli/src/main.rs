//! Confluence CLI: analyze, backtest and sweep commands.
//!
//! Commands:
//! - `analyze`: evaluate the latest candle of each pair, print decision and plan as JSON
//! - `backtest`: replay one pair's history and print performance metrics
//! - `sweep`: grid-search scoring and risk parameters and print the best set
//!
//! Every command reads candles from `--candles <csv>` or generates them with
//! `--synthetic <n>`. Logs go to stderr (`RUST_LOG`, default `confluence=info`).

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use confluence_core::{AnalysisConfig, EvaluationMode};
use confluence_runner::{
    evaluate_pairs, evaluate_pairs_by_volatility, load_candles_csv, resample, run_backtest,
    run_sweep, synthetic_candles, write_artifacts, BacktestOptions, BacktestResult, FillPolicy,
    FitnessMetric, PairInput, SweepGrid,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "confluence",
    about = "Confluence: structural signal detection, scoring and risk planning"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the latest candle and print the decision as JSON.
    Analyze {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        config: ConfigArgs,

        /// Print trade plans as plain text instead of JSON.
        #[arg(long, default_value_t = false)]
        text: bool,

        /// Rank pairs by daily ATR (optional period) and evaluate the most
        /// volatile first; pairs with too little history are dropped.
        #[arg(
            long,
            value_name = "ATR_PERIOD",
            num_args = 0..=1,
            default_missing_value = "14"
        )]
        rank_by_volatility: Option<usize>,
    },
    /// Replay history with stop/target exits and print performance metrics.
    Backtest {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        account: AccountArgs,

        /// Print the full result as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Include the trade list in JSON output.
        #[arg(long, default_value_t = false, requires = "json")]
        trades: bool,

        /// Write result.json and trades.csv into this directory.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Grid-search weights, threshold, penalty and risk multipliers.
    Sweep {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        config: ConfigArgs,

        #[command(flatten)]
        account: AccountArgs,

        /// Built-in grid.
        #[arg(long, value_enum, default_value_t = GridPreset::Scoring)]
        grid: GridPreset,

        /// TOML grid file; overrides --grid.
        #[arg(long)]
        grid_file: Option<PathBuf>,

        /// Metric to maximise: sharpe, total_return, win_rate, profit_factor, max_drawdown.
        #[arg(long, default_value = "sharpe")]
        metric: FitnessMetric,

        /// Number of ranked parameter sets to print.
        #[arg(long, default_value_t = 5)]
        top: usize,

        /// Write the best configuration to this TOML file.
        #[arg(long)]
        save_best: Option<PathBuf>,
    },
}

#[derive(Args)]
struct DataArgs {
    /// CSV with timestamp,open,high,low,close[,volume] columns.
    #[arg(long, conflicts_with = "synthetic")]
    candles: Option<PathBuf>,

    /// Pair name. `analyze --synthetic` accepts it repeatedly.
    #[arg(long, default_value = "EURUSD")]
    pair: Vec<String>,

    /// Higher-timeframe CSV for the trend filter.
    #[arg(long, conflicts_with = "synthetic")]
    trend_candles: Option<PathBuf>,

    /// Generate N seeded synthetic hourly candles instead of reading a CSV.
    #[arg(long, value_name = "N")]
    synthetic: Option<usize>,

    /// Seed for --synthetic.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// With --synthetic: candles per trend-series bar (0 = no trend data).
    #[arg(long, default_value_t = 4)]
    trend_factor: usize,
}

#[derive(Args)]
struct ConfigArgs {
    /// Analysis configuration (TOML). Defaults to the built-in configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Derive each candle's signals from the candles up to it only.
    #[arg(long, default_value_t = false)]
    causal: bool,
}

#[derive(Args)]
struct AccountArgs {
    #[arg(long, default_value_t = 100_000.0)]
    capital: f64,

    /// Commission rate per side.
    #[arg(long, default_value_t = 0.001)]
    commission: f64,

    /// Fill entries at the next candle's open instead of the signal close.
    #[arg(long, default_value_t = false)]
    next_open: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum GridPreset {
    /// Six detector weights, threshold and penalty (102 400 points).
    Standard,
    /// Threshold, penalty, stop multiplier and risk-reward (80 points).
    Scoring,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // per-point trade plans would flood the log during sweeps
    let default_filter = match cli.command {
        Commands::Sweep { .. } => "confluence=warn,confluence_runner=info",
        _ => "confluence=info",
    };
    init_tracing(default_filter);

    match cli.command {
        Commands::Analyze {
            data,
            config,
            text,
            rank_by_volatility,
        } => run_analyze(&data, &config, text, rank_by_volatility),
        Commands::Backtest {
            data,
            config,
            account,
            json,
            trades,
            out_dir,
        } => run_backtest_cmd(&data, &config, &account, json, trades, out_dir),
        Commands::Sweep {
            data,
            config,
            account,
            grid,
            grid_file,
            metric,
            top,
            save_best,
        } => run_sweep_cmd(
            &data,
            &config,
            &account,
            grid,
            grid_file,
            metric,
            top,
            save_best,
        ),
    }
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ─── Inputs ─────────────────────────────────────────────────────────

fn load_config(args: &ConfigArgs) -> Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if args.causal {
        config.mode = EvaluationMode::Causal;
    }
    info!(
        fingerprint = %config.fingerprint()?,
        mode = ?config.mode,
        detectors = config.detectors.len(),
        "configuration ready"
    );
    Ok(config)
}

fn load_inputs(data: &DataArgs) -> Result<Vec<PairInput>> {
    if let Some(n) = data.synthetic {
        warn!("using synthetic candles; results do not describe any real market");
        return data
            .pair
            .iter()
            .enumerate()
            .map(|(i, pair)| -> Result<PairInput> {
                let series = synthetic_candles(pair, n, data.seed.wrapping_add(i as u64))?;
                let input = PairInput::new(series);
                Ok(match data.trend_factor {
                    0 => input,
                    factor => {
                        let trend = resample(&input.series, factor)?;
                        input.with_trend(trend)
                    }
                })
            })
            .collect();
    }

    let Some(path) = &data.candles else {
        bail!("one of --candles or --synthetic is required");
    };
    let [pair] = data.pair.as_slice() else {
        bail!("--candles takes exactly one --pair");
    };
    let series = load_candles_csv(path, pair)
        .with_context(|| format!("loading candles {}", path.display()))?;
    let mut input = PairInput::new(series);
    if let Some(trend_path) = &data.trend_candles {
        let trend = load_candles_csv(trend_path, pair)
            .with_context(|| format!("loading trend candles {}", trend_path.display()))?;
        input = input.with_trend(trend);
    }
    Ok(vec![input])
}

fn single_input(data: &DataArgs, command: &str) -> Result<PairInput> {
    let mut inputs = load_inputs(data)?;
    if inputs.len() != 1 {
        bail!("{command} takes exactly one --pair");
    }
    Ok(inputs.remove(0))
}

fn backtest_options(account: &AccountArgs) -> BacktestOptions {
    BacktestOptions {
        initial_capital: account.capital,
        commission_rate: account.commission,
        fill: if account.next_open {
            FillPolicy::NextOpen
        } else {
            FillPolicy::SignalClose
        },
        ..BacktestOptions::default()
    }
}

// ─── Commands ───────────────────────────────────────────────────────

fn run_analyze(
    data: &DataArgs,
    config: &ConfigArgs,
    text: bool,
    rank_by_volatility: Option<usize>,
) -> Result<()> {
    let config = load_config(config)?;
    let inputs = load_inputs(data)?;
    let results = match rank_by_volatility {
        Some(atr_period) => evaluate_pairs_by_volatility(&inputs, &config, atr_period)?,
        None => evaluate_pairs(&inputs, &config)?,
    };

    if !text {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }
    for result in &results {
        let decision = result.decision.as_ref();
        match decision.and_then(|d| d.plan.as_ref()) {
            Some(plan) => println!("{plan}"),
            None => {
                let why = decision
                    .and_then(|d| d.plan_error.as_ref())
                    .map_or_else(|| "no confluence".to_string(), ToString::to_string);
                println!("{} {}: no trade ({why})", result.direction(), result.pair);
            }
        }
    }
    Ok(())
}

fn run_backtest_cmd(
    data: &DataArgs,
    config: &ConfigArgs,
    account: &AccountArgs,
    json: bool,
    with_trades: bool,
    out_dir: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config)?;
    let input = single_input(data, "backtest")?;
    let result = run_backtest(
        &input.series,
        input.trend.as_ref(),
        &config,
        &backtest_options(account),
    )?;

    if json {
        let mut value = serde_json::to_value(&result)?;
        if let Some(object) = value.as_object_mut() {
            object.remove("equity_curve");
            if !with_trades {
                object.remove("trades");
            }
        }
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print_summary(&result, input.series.len(), data.synthetic.is_some());
    }
    if let Some(dir) = out_dir {
        write_artifacts(&dir, &result)?;
        eprintln!("Artifacts: {}", dir.display());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_sweep_cmd(
    data: &DataArgs,
    config: &ConfigArgs,
    account: &AccountArgs,
    preset: GridPreset,
    grid_file: Option<PathBuf>,
    metric: FitnessMetric,
    top: usize,
    save_best: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config)?;
    let input = single_input(data, "sweep")?;
    let grid = match grid_file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading grid {}", path.display()))?;
            toml::from_str::<SweepGrid>(&content)
                .with_context(|| format!("parsing grid {}", path.display()))?
        }
        None => match preset {
            GridPreset::Standard => SweepGrid::standard(),
            GridPreset::Scoring => SweepGrid::scoring_only(),
        },
    };

    let results = run_sweep(
        &input.series,
        input.trend.as_ref(),
        &config,
        &grid,
        &backtest_options(account),
        metric,
    )?;
    let Some(best) = results.best() else {
        bail!("sweep produced no results");
    };

    println!();
    println!("=== Sweep: {} points, ranked by {metric} ===", results.len());
    println!(
        "{:>4} {:>10} {:>7} {:>9} {:>8} {:>7} {:>9} {:>8} {:>5} {:>5}",
        "Rank", "Fitness", "Trades", "Return", "Sharpe", "WinRate", "Threshold", "Penalty", "SL", "RR"
    );
    println!("{}", "-".repeat(82));
    for (rank, outcome) in results.top_n(top).iter().enumerate() {
        let m = &outcome.metrics;
        println!(
            "{:>4} {:>10.4} {:>7} {:>8.2}% {:>8.3} {:>6.1}% {:>9.2} {:>8.2} {:>5.2} {:>5.2}",
            rank + 1,
            outcome.fitness,
            m.trade_count,
            m.total_return * 100.0,
            m.sharpe,
            m.win_rate * 100.0,
            outcome.point.scoring.signal_threshold,
            outcome.point.scoring.trend_penalty_factor,
            outcome.point.risk.sl_atr_multiplier,
            outcome.point.risk.risk_reward_ratio,
        );
    }

    let best_config = best.point.apply(&config);
    println!();
    println!("--- Best parameters ({metric} = {:.4}) ---", best.fitness);
    println!("{}", toml::to_string_pretty(&best_config)?);
    println!("Fingerprint: {}", best_config.fingerprint()?);
    if let Some(path) = save_best {
        best_config
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Saved to: {}", path.display());
    }
    Ok(())
}

fn print_summary(result: &BacktestResult, candles: usize, synthetic: bool) {
    let m = &result.report.metrics;
    println!();
    println!("=== Backtest Result ===");
    println!("Pair:           {}", result.pair);
    println!("Candles:        {candles}");
    println!("Mode:           {:?}", result.mode);
    println!("Config:         {}", result.config_fingerprint);
    println!("Dataset:        {}", result.dataset_hash);
    println!("Trades:         {}", m.trade_count);
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Final Equity:   {:.2}", m.final_equity);
    println!("Sharpe/trade:   {:.3}", m.sharpe);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Avg Trade:      {:.3}%", m.avg_trade_return * 100.0);
    if result.mode == EvaluationMode::Retrospective {
        println!();
        println!("NOTE: retrospective mode lets some detectors see later candles; use --causal");
    }
    if synthetic {
        println!("WARNING: Results based on SYNTHETIC data");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn candles_and_synthetic_conflict() {
        let parsed = Cli::try_parse_from([
            "confluence",
            "analyze",
            "--candles",
            "eurusd.csv",
            "--synthetic",
            "100",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn sweep_parses_metric_and_defaults() {
        let cli = Cli::try_parse_from([
            "confluence",
            "sweep",
            "--synthetic",
            "300",
            "--metric",
            "total_return",
        ])
        .unwrap();
        match cli.command {
            Commands::Sweep {
                data,
                metric,
                top,
                grid,
                ..
            } => {
                assert_eq!(metric, FitnessMetric::TotalReturn);
                assert_eq!(top, 5);
                assert!(matches!(grid, GridPreset::Scoring));
                assert_eq!(data.pair, vec!["EURUSD".to_string()]);
                assert_eq!(data.synthetic, Some(300));
            }
            _ => panic!("expected sweep"),
        }
    }

    #[test]
    fn synthetic_inputs_cover_every_pair() {
        let cli = Cli::try_parse_from([
            "confluence",
            "analyze",
            "--synthetic",
            "80",
            "--pair",
            "EURUSD",
            "--pair",
            "GBPUSD",
        ])
        .unwrap();
        let Commands::Analyze { data, .. } = cli.command else {
            panic!("expected analyze");
        };
        let inputs = load_inputs(&data).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].pair, "GBPUSD");
        assert_eq!(inputs[0].series.len(), 80);
        assert_eq!(inputs[0].trend.as_ref().map(|t| t.len()), Some(20));
        assert!(single_input(&data, "backtest").is_err());
    }

    #[test]
    fn rank_by_volatility_period_is_optional() {
        let parse = |extra: &[&str]| {
            let mut args = vec!["confluence", "analyze", "--synthetic", "80"];
            args.extend_from_slice(extra);
            match Cli::try_parse_from(args).unwrap().command {
                Commands::Analyze {
                    rank_by_volatility, ..
                } => rank_by_volatility,
                _ => panic!("expected analyze"),
            }
        };
        assert_eq!(parse(&[]), None);
        assert_eq!(
            parse(&["--rank-by-volatility"]),
            Some(confluence_runner::DEFAULT_SELECTOR_ATR_PERIOD)
        );
        assert_eq!(parse(&["--rank-by-volatility", "20"]), Some(20));
    }

    #[test]
    fn next_open_flag_sets_fill_policy() {
        let cli = Cli::try_parse_from(["confluence", "backtest", "--synthetic", "80", "--next-open"])
            .unwrap();
        let Commands::Backtest { account, .. } = cli.command else {
            panic!("expected backtest");
        };
        assert_eq!(backtest_options(&account).fill, FillPolicy::NextOpen);
    }
}
