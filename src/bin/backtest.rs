//! CLI shell around [`paperforge::backtest::run`] (§10). Loads a candle
//! CSV and an `AdaptiveConfig` TOML file, runs the backtest entrypoint,
//! and prints the aggregate metrics as JSON — mirroring the teacher's
//! `src/bin/benchmark.rs` "thin clap wrapper over a library call" shape,
//! minus the multi-symbol/multi-risk-level fan-out this crate doesn't need.

use anyhow::{Context, Result};
use clap::Parser;
use paperforge::domain::candle::Candle;
use paperforge::domain::config::AdaptiveConfig;

#[derive(Parser)]
#[command(author, version, about = "Replay an adaptive-config strategy over a candle CSV")]
struct Cli {
    /// Path to a CSV of candles (columns: timestamp,open,high,low,close,volume)
    #[arg(long)]
    candles: String,

    /// Path to an AdaptiveConfig TOML file
    #[arg(long)]
    config: String,

    /// Asset label attached to the session (cosmetic, not a data source key)
    #[arg(long, default_value = "ETH")]
    asset: String,
}

#[derive(Debug, serde::Deserialize)]
struct CandleRow {
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

fn load_candles(path: &str) -> Result<Vec<Candle>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("opening candle CSV {path}"))?;
    let mut candles = Vec::new();
    for row in reader.deserialize() {
        let row: CandleRow = row.context("parsing candle row")?;
        candles.push(Candle { timestamp: row.timestamp, open: row.open, high: row.high, low: row.low, close: row.close, volume: row.volume });
    }
    Ok(candles)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let candles = load_candles(&cli.candles)?;
    let config_str = std::fs::read_to_string(&cli.config).with_context(|| format!("reading config {}", cli.config))?;
    let config = AdaptiveConfig::from_toml_str(&config_str)?;

    let result = paperforge::backtest::run(&config, &candles, &cli.asset)?;
    println!("{}", serde_json::to_string_pretty(&result.metrics)?);
    tracing::info!(trades = result.trades.len(), periods = result.periods.len(), "backtest complete");
    Ok(())
}
