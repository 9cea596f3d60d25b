//! CLI shell around [`paperforge::strategy_search::search`] (§10). Loads
//! a directory of candidate `AdaptiveConfig` TOML files plus three
//! candle-window CSVs (full-year, bullish, bearish) and prints the ranked
//! list as JSON, mirroring the teacher's `parallel_benchmark.rs` fan-out
//! pattern wrapped in a `clap` binary the way `src/bin/optimize.rs` does.

use anyhow::{Context, Result};
use clap::Parser;
use paperforge::domain::candle::Candle;
use paperforge::domain::config::AdaptiveConfig;

#[derive(Parser)]
#[command(author, version, about = "Rank candidate adaptive configs across full-year/bullish/bearish windows")]
struct Cli {
    /// Directory of candidate AdaptiveConfig TOML files (one candidate per file)
    #[arg(long)]
    candidates_dir: String,

    #[arg(long)]
    full_year_candles: String,

    #[arg(long)]
    bullish_candles: String,

    #[arg(long)]
    bearish_candles: String,

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

fn load_candidates(dir: &str) -> Result<Vec<AdaptiveConfig>> {
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading candidates dir {dir}"))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let contents = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        candidates.push(AdaptiveConfig::from_toml_str(&contents).with_context(|| format!("parsing {}", path.display()))?);
    }
    Ok(candidates)
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let cli = Cli::parse();
    let candidates = load_candidates(&cli.candidates_dir)?;
    if candidates.is_empty() {
        anyhow::bail!("no *.toml candidates found in {}", cli.candidates_dir);
    }
    let full_year = load_candles(&cli.full_year_candles)?;
    let bullish = load_candles(&cli.bullish_candles)?;
    let bearish = load_candles(&cli.bearish_candles)?;

    tracing::info!(candidates = candidates.len(), "starting strategy search");
    let ranked = paperforge::strategy_search::search(&candidates, &full_year, &bullish, &bearish, &cli.asset);
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}
