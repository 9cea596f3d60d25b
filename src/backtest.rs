//! Backtest entrypoint (§6 "CLI / scripting surface"). Grounded on the
//! teacher's `application/optimization/simulator.rs` synchronous replay
//! loop and `domain/performance/stats.rs::Stats::sharpe_ratio`, adapted
//! from `Decimal` to `f64` (see DESIGN.md) and from the teacher's
//! bar-by-bar `Simulator::run` to a direct call over the same
//! regime/arbiter/executor chain the orchestrator drives tick by tick.
//!
//! Unlike [`crate::orchestrator::Orchestrator`], nothing here is async: a
//! backtest has no collaborator boundary to cross, so the whole replay is
//! one synchronous loop over an in-memory candle slice.

use crate::arbiter::AdaptiveStrategyArbiter;
use crate::domain::candle::Candle;
use crate::domain::config::AdaptiveConfig;
use crate::domain::indicators::atr;
use crate::domain::portfolio::{Portfolio, PortfolioSnapshot};
use crate::domain::regime::{Regime, RegimeSignal};
use crate::domain::trade::{Trade, TradeKind};
use crate::error::CoreError;
use crate::executor::{TickInputs, TradeExecutor};
use crate::ports::{RandomTradeIdGenerator, TradeIdGenerator};
use crate::risk::filters::RiskFilterContext;
use crate::session::state::Session;
use crate::strategy::signal::Action;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row of the per-period trace (§6 "per-period analyses").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodAnalysis {
    pub timestamp: i64,
    pub price: f64,
    pub regime: Regime,
    pub momentum_confirmed: bool,
    pub persistence_met: bool,
    pub active_strategy: Option<String>,
    pub signal: f64,
    pub action: Action,
    pub trade: Option<Trade>,
    pub portfolio: PortfolioSnapshot,
}

/// Aggregate metrics named verbatim in §6: `returnPct`, `maxDrawdownPct`,
/// `winRate`, `sharpeRatio` (annualized via `sqrt(252)`), `profitFactor`,
/// `riskAdjustedReturn`, `vsEthHold`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub return_pct: f64,
    pub max_drawdown_pct: f64,
    pub win_rate: f64,
    pub sharpe_ratio: f64,
    pub profit_factor: f64,
    pub risk_adjusted_return: f64,
    pub vs_eth_hold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub periods: Vec<PeriodAnalysis>,
    pub trades: Vec<Trade>,
    pub final_portfolio: Portfolio,
    pub metrics: BacktestMetrics,
}

/// `sqrt(252)`, the trading-days-per-year annualization factor (same
/// constant the teacher hardcodes in `Stats::sharpe_ratio`).
const SQRT_252: f64 = 15.874507866387544;

/// Sample-variance Sharpe ratio over a period-return series — same shape
/// as the teacher's `Stats::sharpe_ratio`, computed in `f64` instead of
/// `Decimal` (§3 numeric-representation note).
pub fn sharpe_ratio(returns: &[f64], annualize: bool) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev <= 1e-9 {
        return 0.0;
    }
    let ratio = mean / std_dev;
    if annualize {
        ratio * SQRT_252
    } else {
        ratio
    }
}

/// Runs the full decision-and-execution chain once per candle, driven by
/// an injected [`TradeIdGenerator`] so two runs over the same candles and
/// config yield byte-identical trade lists (§8 "Running the backtest
/// entrypoint twice ... yields byte-identical trade lists") only when the
/// generator itself is deterministic — [`run`] below wires in the random
/// default; callers that need reproducibility inject their own.
pub fn run_with_ids(
    config: &AdaptiveConfig,
    candles: &[Candle],
    asset: &str,
    ids: &dyn TradeIdGenerator,
) -> Result<BacktestResult, CoreError> {
    config.validate()?;
    if candles.is_empty() {
        return Err(CoreError::InsufficientData { required: 1, actual: 0 });
    }

    let mut session = Session::new(Uuid::new_v4(), asset.to_string(), None, config.clone(), candles[0].timestamp);
    let mut periods = Vec::with_capacity(candles.len());
    let mut max_drawdown_pct = 0.0f64;

    let stop_loss_cfg = config.stop_loss;
    let min_position_size = config.min_position_size;
    let price_validation_threshold = config.price_validation_threshold;
    let max_bullish_position = config.max_bullish_position;

    for i in 0..candles.len() {
        let timestamp = candles[i].timestamp;
        let current_price = candles[i].close;

        let previous_regime = session.regime_persistence_window.last().copied().unwrap_or(Regime::Neutral);
        let preview: RegimeSignal = crate::domain::regime::MarketRegimeDetector::detect(candles, i, previous_regime, None);
        session.push_persistence_window(preview.regime);
        session.push_regime_if_changed(timestamp, preview.regime);

        let risk_ctx = RiskFilterContext {
            returns_stdev: preview.volatility,
            regime_history: &session.regime_persistence_window,
            recent_outcomes: &session.recent_outcomes,
            peak_value: session.peak_value,
            current_value: session.portfolio.total_value,
            is_emergency_stopped: session.is_emergency_stopped,
        };

        let arbiter_out = AdaptiveStrategyArbiter::arbitrate(
            candles,
            i,
            &session.config,
            previous_regime,
            &session.regime_persistence_window,
            &risk_ctx,
            &session.trades,
            None,
        );

        if let Some(strategy) = &arbiter_out.active_strategy {
            session.push_strategy_switch_if_changed(timestamp, &strategy.name);
        }

        let atr_at_entry = stop_loss_cfg.filter(|c| c.enabled).and_then(|c| atr(&candles[..=i], c.atr_period, c.use_ema)[i]);
        let strategy_max_position_pct = arbiter_out.active_strategy.as_ref().map(|s| s.max_position_pct).unwrap_or(0.0);

        let tick_inputs = TickInputs {
            current_price,
            signal_price: current_price,
            action: arbiter_out.action,
            signal: arbiter_out.signal,
            confidence: arbiter_out.confidence,
            position_size_multiplier: arbiter_out.position_size_multiplier,
            kelly_multiplier: arbiter_out.kelly_multiplier,
            max_position_pct: strategy_max_position_pct,
            max_bullish_position,
            min_position_size,
            price_validation_threshold,
            stop_loss: stop_loss_cfg.as_ref(),
            atr_at_entry,
            timestamp,
        };

        let outcome = TradeExecutor::execute_tick(
            &mut session.portfolio,
            &mut session.trades,
            &mut session.open_positions,
            &mut session.recent_outcomes,
            ids,
            &tick_inputs,
        );

        session.update_drawdown_tracker();
        max_drawdown_pct = max_drawdown_pct.max(session.current_drawdown * 100.0);

        let snapshot = PortfolioSnapshot {
            timestamp,
            quote_balance: session.portfolio.quote_balance,
            base_balance: session.portfolio.base_balance,
            total_value: session.portfolio.total_value,
            price: current_price,
        };
        session.push_portfolio_snapshot(snapshot);

        periods.push(PeriodAnalysis {
            timestamp,
            price: current_price,
            regime: arbiter_out.regime.regime,
            momentum_confirmed: arbiter_out.momentum_confirmed,
            persistence_met: arbiter_out.persistence_met,
            active_strategy: arbiter_out.active_strategy.as_ref().map(|s| s.name.clone()),
            signal: arbiter_out.signal,
            action: arbiter_out.action,
            trade: outcome.stop_loss_exit.or(outcome.signal_trade),
            portfolio: snapshot,
        });
    }

    let metrics = compute_metrics(&session.portfolio, &session.trades, &session.portfolio_history, max_drawdown_pct, candles);

    Ok(BacktestResult { periods, trades: session.trades, final_portfolio: session.portfolio, metrics })
}

/// Convenience wrapper over [`run_with_ids`] using [`RandomTradeIdGenerator`].
pub fn run(config: &AdaptiveConfig, candles: &[Candle], asset: &str) -> Result<BacktestResult, CoreError> {
    run_with_ids(config, candles, asset, &RandomTradeIdGenerator)
}

fn compute_metrics(
    portfolio: &Portfolio,
    trades: &[Trade],
    history: &[PortfolioSnapshot],
    max_drawdown_pct: f64,
    candles: &[Candle],
) -> BacktestMetrics {
    let return_pct = portfolio.total_return_pct;
    let win_rate = portfolio.win_rate();

    let period_returns: Vec<f64> = history
        .windows(2)
        .filter_map(|pair| {
            if pair[0].total_value > 0.0 {
                Some((pair[1].total_value - pair[0].total_value) / pair[0].total_value)
            } else {
                None
            }
        })
        .collect();
    let sharpe = sharpe_ratio(&period_returns, true);

    let (gross_wins, gross_losses) = trades.iter().filter(|t| t.kind == TradeKind::Sell).fold((0.0, 0.0), |(w, l), t| {
        match t.pnl {
            Some(pnl) if pnl > 0.0 => (w + pnl, l),
            Some(pnl) if pnl < 0.0 => (w, l - pnl),
            _ => (w, l),
        }
    });
    let profit_factor = if gross_losses > 0.0 { gross_wins / gross_losses } else if gross_wins > 0.0 { f64::INFINITY } else { 0.0 };

    let risk_adjusted_return = if max_drawdown_pct > 0.0 { return_pct / max_drawdown_pct } else { 0.0 };

    let vs_eth_hold = match (candles.first(), candles.last()) {
        (Some(first), Some(last)) if first.close > 0.0 => {
            let hold_return_pct = (last.close - first.close) / first.close * 100.0;
            return_pct - hold_return_pct
        }
        _ => 0.0,
    };

    BacktestMetrics { return_pct, max_drawdown_pct, win_rate, sharpe_ratio: sharpe, profit_factor, risk_adjusted_return, vs_eth_hold }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Timeframe;
    use crate::domain::config::{IndicatorConfig, IndicatorKind, StrategyConfig};
    use crate::ports::CountingTradeIdGenerator;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let interval = Timeframe::OneHour.to_millis();
        closes
            .iter()
            .enumerate()
            .map(|(idx, &c)| Candle { timestamp: idx as i64 * interval, open: c, high: c * 1.01, low: c * 0.99, close: c, volume: 1.0 })
            .collect()
    }

    fn strategy(name: &str) -> StrategyConfig {
        StrategyConfig {
            name: name.into(),
            timeframe: Timeframe::OneHour,
            indicators: vec![IndicatorConfig { kind: IndicatorKind::Rsi { period: 14 }, weight: 1.0 }],
            buy_threshold: 0.2,
            sell_threshold: -0.2,
            max_position_pct: 0.5,
            initial_capital: 1000.0,
        }
    }

    fn config() -> AdaptiveConfig {
        AdaptiveConfig {
            bullish: strategy("bullish"),
            bearish: strategy("bearish"),
            neutral: Some(strategy("neutral")),
            regime_confidence_threshold: 0.5,
            momentum_confirmation_threshold: 0.25,
            regime_persistence_periods: 3,
            bullish_position_multiplier: 1.0,
            dynamic_position_sizing: true,
            max_bullish_position: 0.9,
            max_volatility: 0.5,
            circuit_breaker_win_rate: 0.3,
            circuit_breaker_lookback: 20,
            whipsaw_detection_periods: 5,
            whipsaw_max_changes: 3,
            max_drawdown_threshold: 0.5,
            kelly: None,
            stop_loss: None,
            price_validation_threshold: 0.05,
            min_position_size: 1.0,
        }
    }

    #[test]
    fn empty_candles_is_insufficient_data() {
        let err = run(&config(), &[], "ETH").unwrap_err();
        assert!(matches!(err, CoreError::InsufficientData { .. }));
    }

    #[test]
    fn replay_over_uptrend_produces_one_period_per_candle() {
        let closes: Vec<f64> = (0..100).map(|x| 100.0 + x as f64).collect();
        let candles = candles_from_closes(&closes);
        let result = run(&config(), &candles, "ETH").unwrap();
        assert_eq!(result.periods.len(), candles.len());
    }

    #[test]
    fn two_runs_with_same_deterministic_ids_are_byte_identical() {
        let closes: Vec<f64> = (0..120).map(|x| 100.0 + (x as f64 * 0.3).sin() * 10.0 + x as f64 * 0.5).collect();
        let candles = candles_from_closes(&closes);
        let cfg = config();

        let ids_a = CountingTradeIdGenerator::new();
        let a = run_with_ids(&cfg, &candles, "ETH", &ids_a).unwrap();
        let ids_b = CountingTradeIdGenerator::new();
        let b = run_with_ids(&cfg, &candles, "ETH", &ids_b).unwrap();

        let ser_a = serde_json::to_vec(&a.trades).unwrap();
        let ser_b = serde_json::to_vec(&b.trades).unwrap();
        assert_eq!(ser_a, ser_b);
    }

    #[test]
    fn vs_eth_hold_is_zero_when_flat() {
        let closes = vec![100.0; 80];
        let candles = candles_from_closes(&closes);
        let result = run(&config(), &candles, "ETH").unwrap();
        assert!((result.metrics.vs_eth_hold - result.metrics.return_pct).abs() < 1e-9);
    }
}
