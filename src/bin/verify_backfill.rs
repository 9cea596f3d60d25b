//! CLI shell around the backfill verifier (§8 "given an active session,
//! reproduces its final portfolio value to within 1% and trade count to
//! within 2"). Reads a persisted [`paperforge::Session`] snapshot from a
//! local file — standing in for the KV store this binary intentionally
//! doesn't open a connection to (§10) — and a candle CSV covering the
//! same window, replays the backtest entrypoint over the session's own
//! config, and reports whether the reproduction is within tolerance.

use anyhow::{Context, Result};
use clap::Parser;
use paperforge::domain::candle::Candle;
use paperforge::Session;

#[derive(Parser)]
#[command(author, version, about = "Replay a persisted session's candle history and compare reproduced vs stored state")]
struct Cli {
    /// Path to a JSON file holding a persisted Session snapshot
    #[arg(long)]
    session: String,

    /// Path to a CSV of candles spanning the session's started_at..last_update window
    #[arg(long)]
    candles: String,
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
    let snapshot_bytes = std::fs::read(&cli.session).with_context(|| format!("reading session snapshot {}", cli.session))?;
    let stored: Session = serde_json::from_slice(&snapshot_bytes).context("parsing session snapshot JSON")?;
    let candles = load_candles(&cli.candles)?;

    let reproduced = paperforge::backtest::run(&stored.config, &candles, &stored.asset)?;

    let stored_value = stored.portfolio.total_value;
    let reproduced_value = reproduced.final_portfolio.total_value;
    let value_diff_pct = if stored_value.abs() > 1e-9 { ((reproduced_value - stored_value) / stored_value).abs() * 100.0 } else { 0.0 };

    let stored_trade_count = stored.portfolio.trade_count;
    let reproduced_trade_count = reproduced.final_portfolio.trade_count;
    let trade_count_diff = reproduced_trade_count.abs_diff(stored_trade_count);

    let value_ok = value_diff_pct <= 1.0;
    let trade_count_ok = trade_count_diff <= 2;

    println!(
        "{}",
        serde_json::json!({
            "stored_total_value": stored_value,
            "reproduced_total_value": reproduced_value,
            "value_diff_pct": value_diff_pct,
            "value_within_tolerance": value_ok,
            "stored_trade_count": stored_trade_count,
            "reproduced_trade_count": reproduced_trade_count,
            "trade_count_diff": trade_count_diff,
            "trade_count_within_tolerance": trade_count_ok,
        })
    );

    if !value_ok || !trade_count_ok {
        anyhow::bail!("backfill verification failed tolerance check");
    }
    Ok(())
}
