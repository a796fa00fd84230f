//! Backtest Lab: strategy backtesting and pattern inference from the command line
//!
//! Usage:
//!   backtest-lab run --candles btc_1h.json --strategy RSI_DIV      # Backtest one strategy
//!   backtest-lab compare --candles btc_1h.json                      # Strategy vs buy-and-hold
//!   backtest-lab train --candles btc_1h.json                        # Learn thresholds from the oracle
//!   backtest-lab infer --candles btc_1h.json --marks marks.json     # Infer a strategy from marked trades

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use engine::{
    infer_strategy_from_marks, train_from_oracle, BacktestConfig, BacktestEngine, BacktestResult,
    Candle, Mark, StrategyKind, StrategyParams, Trade, TradeSide,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

/// Environment override for the starting capital
const CAPITAL_ENV: &str = "BACKTEST_LAB_CAPITAL";

#[derive(Parser)]
#[command(name = "backtest-lab")]
#[command(about = "Strategy backtesting and pattern inference over candle files", long_about = None)]
#[command(version = APP_VERSION)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the backtest configuration comes from
#[derive(clap::Args)]
struct StrategyArgs {
    /// JSON array of candles
    #[arg(long)]
    candles: PathBuf,
    /// JSON backtest config ({"initial_capital": .., "strategy": {"type": .., "params": {..}}})
    #[arg(long)]
    config: Option<PathBuf>,
    /// Strategy name (TREND, GRID, BREAKOUT, BITCOINBEY, RSI_DIV, ORACLE, METAMORPHOSIS, LEARNED)
    #[arg(short, long)]
    strategy: Option<String>,
    /// Strategy params as a JSON object
    #[arg(short, long)]
    params: Option<String>,
    /// Starting capital
    #[arg(long)]
    capital: Option<Decimal>,
    /// Optional JSON export path
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest one strategy over a candle file
    Run {
        #[command(flatten)]
        args: StrategyArgs,
        /// Number of ledger entries to print
        #[arg(long, default_value_t = 20)]
        show_trades: usize,
    },
    /// Backtest a strategy alongside a buy-and-hold benchmark
    Compare {
        #[command(flatten)]
        args: StrategyArgs,
    },
    /// Run the lookahead oracle and derive LEARNED thresholds from its trades
    Train {
        /// JSON array of candles
        #[arg(long)]
        candles: PathBuf,
        /// Oracle params as a JSON object (lookahead, min_move_pct)
        #[arg(short, long)]
        params: Option<String>,
        /// Optional JSON export path
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Infer a LEARNED strategy from marked BUY/SELL points
    Infer {
        /// JSON array of candles
        #[arg(long)]
        candles: PathBuf,
        /// JSON array of marks ({"date": "YYYY-MM-DD HH:MM" | "time": ms, "side": "BUY"|"SELL"})
        #[arg(long)]
        marks: PathBuf,
        /// Backtest the inferred strategy right away
        #[arg(long)]
        backtest: bool,
        /// Optional JSON export path
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// List the available strategies
    Strategies,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,engine=debug,backtest_lab=debug")
        } else {
            EnvFilter::new("info,engine=info,backtest_lab=info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { args, show_trades } => cmd_run(args, show_trades)?,
        Commands::Compare { args } => cmd_compare(args)?,
        Commands::Train {
            candles,
            params,
            export,
        } => cmd_train(&candles, params.as_deref(), export)?,
        Commands::Infer {
            candles,
            marks,
            backtest,
            export,
        } => cmd_infer(&candles, &marks, backtest, export)?,
        Commands::Strategies => {
            for kind in StrategyKind::all() {
                println!("  {}", kind);
            }
        }
    }

    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_run(args: StrategyArgs, show_trades: usize) -> anyhow::Result<()> {
    println!("\n=== Backtest Lab v{} ===", APP_VERSION);

    let candles = load_candles(&args.candles)?;
    let config = build_config(&args)?;
    print_header(&config, &args.candles, candles.len());

    let result = BacktestEngine::run(&config, &candles);
    print_result(&result);
    print_trades(&result.trades, show_trades);

    if let Some(path) = args.export {
        export_json(&path, &result)?;
    }
    Ok(())
}

fn cmd_compare(args: StrategyArgs) -> anyhow::Result<()> {
    println!("\n=== Backtest Lab v{} ===", APP_VERSION);

    let candles = load_candles(&args.candles)?;
    let config = build_config(&args)?;
    print_header(&config, &args.candles, candles.len());

    let comparison = BacktestEngine::compare(&config, &candles);
    print_result(&comparison.strategy);

    match comparison.benchmark.last() {
        Some(last) => {
            let hold_return = if config.initial_capital > Decimal::ZERO {
                (last.equity - config.initial_capital) / config.initial_capital * Decimal::from(100)
            } else {
                Decimal::ZERO
            };
            println!(
                "  Buy & hold: {:.2} ({:+.2}%) | Strategy edge: {:+.2}%",
                last.equity,
                hold_return,
                comparison.strategy.metrics.total_return_pct - hold_return
            );
        }
        None => println!("  Buy & hold: no data"),
    }

    if let Some(path) = args.export {
        export_json(&path, &comparison)?;
    }
    Ok(())
}

fn cmd_train(candles: &Path, params: Option<&str>, export: Option<PathBuf>) -> anyhow::Result<()> {
    let series = load_candles(candles)?;
    let oracle_params = parse_params(params)?;

    let report = train_from_oracle(&series, &oracle_params)?;
    println!("\n{}", report.message);
    println!("Learned params: {}", serde_json::to_string(&report.learned_params)?);

    if let Some(path) = export {
        export_json(&path, &report)?;
    }
    Ok(())
}

fn cmd_infer(
    candles: &Path,
    marks: &Path,
    backtest: bool,
    export: Option<PathBuf>,
) -> anyhow::Result<()> {
    let series = load_candles(candles)?;
    let marks: Vec<Mark> = read_json(marks)?;
    let buys = marks.iter().filter(|m| m.side == TradeSide::Buy).count();
    info!(marks = marks.len(), buys, "Loaded marks");

    let inferred = infer_strategy_from_marks(&series, &marks)?;
    println!("\nInferred {} strategy ({} marks matched)", inferred.kind, inferred.matched_marks);
    for line in &inferred.explanation {
        println!("  - {}", line);
    }
    println!("Params: {}", serde_json::to_string(&inferred.params)?);

    if backtest {
        let config = BacktestConfig {
            initial_capital: capital_from_env()?.unwrap_or(BacktestConfig::default().initial_capital),
            strategy: inferred.selection(),
        };
        let result = BacktestEngine::run(&config, &series);
        print_result(&result);
    }

    if let Some(path) = export {
        export_json(&path, &inferred)?;
    }
    Ok(())
}

// ============================================================================
// Input
// ============================================================================

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_candles(path: &Path) -> anyhow::Result<Vec<Candle>> {
    let mut candles: Vec<Candle> = read_json(path)?;
    if candles.windows(2).any(|w| w[0].timestamp > w[1].timestamp) {
        candles.sort_by_key(|c| c.timestamp);
    }
    info!(count = candles.len(), path = %path.display(), "Loaded candles");
    Ok(candles)
}

fn parse_params(raw: Option<&str>) -> anyhow::Result<StrategyParams> {
    match raw {
        Some(json) => serde_json::from_str(json).context("--params must be a JSON object"),
        None => Ok(StrategyParams::new()),
    }
}

fn capital_from_env() -> anyhow::Result<Option<Decimal>> {
    match std::env::var(CAPITAL_ENV) {
        Ok(raw) => raw
            .trim()
            .parse::<Decimal>()
            .map(Some)
            .with_context(|| format!("{} is not a number: {}", CAPITAL_ENV, raw)),
        Err(_) => Ok(None),
    }
}

/// Config file first, then environment, then flags
fn build_config(args: &StrategyArgs) -> anyhow::Result<BacktestConfig> {
    let mut config = match &args.config {
        Some(path) => read_json::<BacktestConfig>(path)?,
        None => BacktestConfig::default(),
    };

    if let Some(capital) = capital_from_env()? {
        config.initial_capital = capital;
    }
    if let Some(capital) = args.capital {
        config.initial_capital = capital;
    }
    if let Some(name) = &args.strategy {
        config.strategy.kind = StrategyKind::parse(name);
    }
    if args.params.is_some() {
        config.strategy.params = parse_params(args.params.as_deref())?;
    }

    anyhow::ensure!(
        config.initial_capital > Decimal::ZERO,
        "Initial capital must be positive"
    );
    Ok(config)
}

// ============================================================================
// Output
// ============================================================================

fn export_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("\nResults exported to {}", path.display());
    Ok(())
}

fn format_time(timestamp: i64) -> String {
    Utc.timestamp_millis_opt(timestamp)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_header(config: &BacktestConfig, candles: &Path, count: usize) {
    println!("Candles: {} ({} bars)", candles.display(), count);
    println!(
        "Strategy: {} | Capital: {} | Params: {}",
        config.strategy.kind,
        config.initial_capital,
        serde_json::to_string(&config.strategy.params).unwrap_or_default()
    );
    println!();
}

fn print_result(result: &BacktestResult) {
    let m = &result.metrics;
    println!("\n{} Results:", result.strategy);
    println!(
        "  Final equity: {:.2} | Return: {:+.2}% | Max DD: {:.2}%",
        m.final_equity, m.total_return_pct, m.max_drawdown_pct
    );
    println!(
        "  Ledger: {} entries | Closed: {} ({} won, {} lost) | WR: {:.1}% | Realized: {:+.2}",
        m.total_trades,
        m.winning_trades + m.losing_trades,
        m.winning_trades,
        m.losing_trades,
        m.win_rate,
        m.realized_pnl
    );
}

fn print_trades(trades: &[Trade], limit: usize) {
    if trades.is_empty() || limit == 0 {
        return;
    }
    println!("\nFirst {} Trades:", trades.len().min(limit));
    println!(
        "  {:>3}  {:<17} {:<5} {:<12} {:>12} {:>12}",
        "#", "Time", "Side", "Kind", "Price", "PnL"
    );
    println!("  {}", "-".repeat(68));
    for (i, t) in trades.iter().take(limit).enumerate() {
        let pnl = t
            .pnl
            .map(|p| format!("{:+.2}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>3}  {:<17} {:<5} {:<12} {:>12.2} {:>12}",
            i + 1,
            format_time(t.timestamp),
            format!("{:?}", t.side).to_uppercase(),
            format!("{:?}", t.kind),
            t.price,
            pnl
        );
    }
}
