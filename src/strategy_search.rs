//! Strategy-search entrypoint (§6 "CLI / scripting surface"). Grounded on
//! the teacher's `application/optimization/parallel_benchmark.rs`
//! rayon-driven fan-out: each candidate config runs its three backtests
//! independently, so `par_iter` is the whole parallelism story — there is
//! no shared mutable state across candidates.

use crate::backtest::{self, BacktestMetrics};
use crate::domain::candle::Candle;
use crate::domain::config::AdaptiveConfig;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub name: String,
    pub score: f64,
    pub full_year: BacktestMetrics,
    pub bullish: BacktestMetrics,
    pub bearish: BacktestMetrics,
}

/// Runs every candidate's full-year/bullish/bearish backtest in parallel
/// and ranks by the weighted score from §6: 30% full-year-vs-hold, 20%
/// bullish-vs-hold, 20% bearish-vs-hold, 10% absolute return, 10%
/// risk-adjusted return, 5% win rate, 3% Sharpe, 2% profit factor.
/// Candidates whose backtest fails (e.g. `ConfigInvalid`) are dropped with
/// a score of 0 rather than aborting the whole search.
pub fn search(candidates: &[AdaptiveConfig], full_year: &[Candle], bullish: &[Candle], bearish: &[Candle], asset: &str) -> Vec<CandidateScore> {
    let mut scored: Vec<CandidateScore> = candidates
        .par_iter()
        .filter_map(|cfg| {
            let full = backtest::run(cfg, full_year, asset).ok()?.metrics;
            let bull = backtest::run(cfg, bullish, asset).ok()?.metrics;
            let bear = backtest::run(cfg, bearish, asset).ok()?.metrics;
            let score = weighted_score(&full, &bull, &bear);
            Some(CandidateScore { name: cfg.bullish.name.clone(), score, full_year: full, bullish: bull, bearish: bear })
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Maps a `vs_eth_hold` outperformance (in percentage points) to a
/// `[0,100]` subscore: 0pp outperformance scores 50, symmetric about it.
/// §6 names the weighted-average formula but not this inner mapping —
/// resolved here and recorded in DESIGN.md.
fn vs_hold_subscore(vs_hold_pct: f64) -> f64 {
    (50.0 + vs_hold_pct).clamp(0.0, 100.0)
}

fn absolute_return_subscore(return_pct: f64) -> f64 {
    (50.0 + return_pct).clamp(0.0, 100.0)
}

fn risk_adjusted_subscore(risk_adjusted_return: f64) -> f64 {
    (50.0 + risk_adjusted_return * 10.0).clamp(0.0, 100.0)
}

fn win_rate_subscore(win_rate: f64) -> f64 {
    (win_rate * 100.0).clamp(0.0, 100.0)
}

fn sharpe_subscore(sharpe: f64) -> f64 {
    (50.0 + sharpe * 10.0).clamp(0.0, 100.0)
}

fn profit_factor_subscore(profit_factor: f64) -> f64 {
    if profit_factor.is_infinite() {
        100.0
    } else {
        (profit_factor * 25.0).clamp(0.0, 100.0)
    }
}

fn weighted_score(full_year: &BacktestMetrics, bullish: &BacktestMetrics, bearish: &BacktestMetrics) -> f64 {
    0.30 * vs_hold_subscore(full_year.vs_eth_hold)
        + 0.20 * vs_hold_subscore(bullish.vs_eth_hold)
        + 0.20 * vs_hold_subscore(bearish.vs_eth_hold)
        + 0.10 * absolute_return_subscore(full_year.return_pct)
        + 0.10 * risk_adjusted_subscore(full_year.risk_adjusted_return)
        + 0.05 * win_rate_subscore(full_year.win_rate)
        + 0.03 * sharpe_subscore(full_year.sharpe_ratio)
        + 0.02 * profit_factor_subscore(full_year.profit_factor)
}
