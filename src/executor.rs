//! C7 — FIFO Trade Executor (§4.7). One call per tick, after the arbiter
//! returns. Phase order is fixed: stop-loss sweep, then new entry/exit,
//! then bookkeeping — grounded in the teacher's `application/executor.rs`
//! fill-and-mutate style, adapted from its mpsc-driven loop to a single
//! synchronous call per tick (§5).

use crate::domain::portfolio::Portfolio;
use crate::domain::trade::{OpenPosition, Trade, TradeKind};
use crate::ports::TradeIdGenerator;
use crate::risk::stop_loss::StopLossTracker;
use crate::strategy::signal::Action;
use crate::domain::config::StopLossConfig;

/// Flat proportional fee applied to both sides of a fill (§6 "Fees and price semantics").
pub const FEE_RATE: f64 = 0.001;

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Set when Phase A forced a stop-loss exit; Phase B is skipped this tick.
    pub stop_loss_exit: Option<Trade>,
    /// Set when Phase B executed a signal-driven Buy or Sell.
    pub signal_trade: Option<Trade>,
}

impl ExecutionOutcome {
    fn none() -> Self {
        Self { stop_loss_exit: None, signal_trade: None }
    }
}

#[allow(clippy::too_many_arguments)]
pub struct TickInputs<'a> {
    pub current_price: f64,
    pub signal_price: f64,
    pub action: Action,
    pub signal: f64,
    pub confidence: f64,
    pub position_size_multiplier: f64,
    pub kelly_multiplier: f64,
    pub max_position_pct: f64,
    pub max_bullish_position: f64,
    pub min_position_size: f64,
    pub price_validation_threshold: f64,
    pub stop_loss: Option<&'a StopLossConfig>,
    /// ATR at the current index, computed by the caller from the live
    /// candle series (§4.1) before this tick's Buy fill, if any.
    pub atr_at_entry: Option<f64>,
    pub timestamp: i64,
}

pub struct TradeExecutor;

impl TradeExecutor {
    /// Mutates `portfolio`, `trades`, `open_positions`, and
    /// `recent_outcomes` (capped at 20, §4.10) in place; returns what
    /// happened this tick for the orchestrator to log/notify/snapshot.
    pub fn execute_tick(
        portfolio: &mut Portfolio,
        trades: &mut Vec<Trade>,
        open_positions: &mut Vec<OpenPosition>,
        recent_outcomes: &mut Vec<bool>,
        ids: &dyn TradeIdGenerator,
        inputs: &TickInputs,
    ) -> ExecutionOutcome {
        // Phase A — stop-loss sweep. Any forced exit preempts Phase B.
        if let Some(stop_cfg) = inputs.stop_loss.filter(|c| c.enabled) {
            for idx in 0..open_positions.len() {
                let exit_price = StopLossTracker::update(&mut open_positions[idx], inputs.current_price, stop_cfg);
                if let Some(exit_price) = exit_price {
                    let position = open_positions.remove(idx);
                    let trade = Self::force_exit(portfolio, trades, recent_outcomes, ids, &position, exit_price, inputs.timestamp);
                    return ExecutionOutcome { stop_loss_exit: Some(trade), signal_trade: None };
                }
            }
        }

        // Phase B — new entry / exit.
        let signal_trade = match inputs.action {
            Action::Hold => None,
            Action::Buy if portfolio.quote_balance > 0.0 && inputs.signal > 0.0 => {
                Self::try_buy(portfolio, trades, open_positions, ids, inputs)
            }
            Action::Sell if portfolio.base_balance > 0.0 && inputs.signal < 0.0 => {
                Self::try_sell(portfolio, trades, recent_outcomes, ids, open_positions, inputs)
            }
            _ => None,
        };

        // Phase C — bookkeeping.
        portfolio.mark_to_market(inputs.current_price);

        ExecutionOutcome { stop_loss_exit: None, signal_trade }
    }

    fn force_exit(
        portfolio: &mut Portfolio,
        trades: &mut Vec<Trade>,
        recent_outcomes: &mut Vec<bool>,
        ids: &dyn TradeIdGenerator,
        position: &OpenPosition,
        exit_price: f64,
        timestamp: i64,
    ) -> Trade {
        let buy = trades
            .iter_mut()
            .find(|t| t.id == position.buy_trade_id)
            .expect("open position must reference an extant buy trade");
        let base_amount = buy.base_amount;
        let cost_basis = buy.cost_basis.unwrap_or(0.0);

        let gross = base_amount * exit_price;
        let fee = gross * FEE_RATE;
        let net_proceeds = gross - fee;
        let pnl = net_proceeds - cost_basis;

        buy.fully_sold = true;

        portfolio.base_balance -= base_amount;
        portfolio.quote_balance += net_proceeds;
        portfolio.trade_count += 1;
        if pnl > 0.0 {
            portfolio.win_count += 1;
        }
        Self::record_outcome(recent_outcomes, pnl > 0.0);

        let trade = Trade {
            id: ids.next_id(),
            timestamp,
            kind: TradeKind::Sell,
            price: exit_price,
            base_amount,
            quote_amount: net_proceeds,
            signal: 0.0,
            confidence: 0.0,
            portfolio_value_after: portfolio.quote_balance + portfolio.base_balance * exit_price,
            cost_basis: Some(cost_basis),
            pnl: Some(pnl),
            fully_sold: false,
        };
        trades.push(trade.clone());
        trade
    }

    fn try_buy(
        portfolio: &mut Portfolio,
        trades: &mut Vec<Trade>,
        open_positions: &mut Vec<OpenPosition>,
        ids: &dyn TradeIdGenerator,
        inputs: &TickInputs,
    ) -> Option<Trade> {
        let desired_pct = (inputs.max_position_pct * inputs.position_size_multiplier).min(inputs.max_bullish_position);
        let position_quote = portfolio.quote_balance * inputs.confidence * desired_pct * inputs.kelly_multiplier;

        if position_quote < inputs.min_position_size {
            return None;
        }

        if inputs.signal_price != 0.0 {
            let drift = (inputs.current_price - inputs.signal_price).abs() / inputs.signal_price;
            if drift > inputs.price_validation_threshold {
                return None;
            }
        }

        let base_amount = position_quote / inputs.current_price;
        let fee = position_quote * FEE_RATE;
        let total_cost = position_quote + fee;
        if portfolio.quote_balance < total_cost {
            return None;
        }

        portfolio.quote_balance -= total_cost;
        portfolio.base_balance += base_amount;
        portfolio.trade_count += 1;

        let trade = Trade {
            id: ids.next_id(),
            timestamp: inputs.timestamp,
            kind: TradeKind::Buy,
            price: inputs.current_price,
            base_amount,
            quote_amount: total_cost,
            signal: inputs.signal,
            confidence: inputs.confidence,
            portfolio_value_after: portfolio.quote_balance + portfolio.base_balance * inputs.current_price,
            cost_basis: Some(total_cost),
            pnl: None,
            fully_sold: false,
        };
        trades.push(trade.clone());

        if let (Some(stop_cfg), Some(atr)) = (inputs.stop_loss.filter(|c| c.enabled), inputs.atr_at_entry) {
            let position = StopLossTracker::open(trade.id, inputs.current_price, atr, stop_cfg.atr_multiplier);
            open_positions.push(position);
        }

        Some(trade)
    }

    fn try_sell(
        portfolio: &mut Portfolio,
        trades: &mut Vec<Trade>,
        recent_outcomes: &mut Vec<bool>,
        _ids: &dyn TradeIdGenerator,
        open_positions: &mut Vec<OpenPosition>,
        inputs: &TickInputs,
    ) -> Option<Trade> {
        let base_to_sell = (portfolio.base_balance * inputs.confidence * inputs.max_position_pct * inputs.kelly_multiplier)
            .min(portfolio.base_balance);
        if base_to_sell <= 0.0 {
            return None;
        }

        let gross = base_to_sell * inputs.current_price;
        let fee = gross * FEE_RATE;
        let net_proceeds = gross - fee;

        let mut remaining = base_to_sell;
        let mut total_cost_basis = 0.0;
        let mut fully_sold_ids = Vec::new();

        for buy in trades.iter_mut().filter(|t| t.kind == TradeKind::Buy && !t.fully_sold) {
            if remaining <= 0.0 {
                break;
            }
            let used = remaining.min(buy.base_amount);
            if used <= 0.0 {
                continue;
            }
            let buy_cost_basis = buy.cost_basis.unwrap_or(0.0);
            let consumed = buy_cost_basis * used / buy.base_amount;
            total_cost_basis += consumed;

            if used >= buy.base_amount {
                buy.fully_sold = true;
                fully_sold_ids.push(buy.id);
            } else {
                buy.base_amount -= used;
                buy.cost_basis = Some(buy_cost_basis - consumed);
            }
            remaining -= used;
        }

        let pnl = net_proceeds - total_cost_basis;

        portfolio.base_balance -= base_to_sell;
        portfolio.quote_balance += net_proceeds;
        portfolio.trade_count += 1;
        if pnl > 0.0 {
            portfolio.win_count += 1;
        }
        Self::record_outcome(recent_outcomes, pnl > 0.0);

        open_positions.retain(|p| !fully_sold_ids.contains(&p.buy_trade_id));

        let trade = Trade {
            id: _ids.next_id(),
            timestamp: inputs.timestamp,
            kind: TradeKind::Sell,
            price: inputs.current_price,
            base_amount: base_to_sell,
            quote_amount: net_proceeds,
            signal: inputs.signal,
            confidence: inputs.confidence,
            portfolio_value_after: portfolio.quote_balance + portfolio.base_balance * inputs.current_price,
            cost_basis: Some(total_cost_basis),
            pnl: Some(pnl),
            fully_sold: false,
        };
        trades.push(trade.clone());
        Some(trade)
    }

    fn record_outcome(recent_outcomes: &mut Vec<bool>, win: bool) {
        recent_outcomes.push(win);
        if recent_outcomes.len() > 20 {
            recent_outcomes.remove(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::CountingTradeIdGenerator;

    fn inputs(action: Action, price: f64, signal: f64, confidence: f64) -> TickInputs<'static> {
        TickInputs {
            current_price: price,
            signal_price: price,
            action,
            signal,
            confidence,
            position_size_multiplier: 1.0,
            kelly_multiplier: 1.0,
            max_position_pct: 0.75,
            max_bullish_position: 0.9,
            min_position_size: 10.0,
            price_validation_threshold: 0.02,
            stop_loss: None,
            atr_at_entry: None,
            timestamp: 0,
        }
    }

    #[test]
    fn scenario_s1_buy_then_profitable_sell() {
        let mut portfolio = Portfolio::new(1000.0);
        let mut trades = Vec::new();
        let mut open_positions = Vec::new();
        let mut outcomes = Vec::new();
        let ids = CountingTradeIdGenerator::new();

        let buy_inputs = inputs(Action::Buy, 1010.0, 1.0, 1.0);
        let outcome = TradeExecutor::execute_tick(&mut portfolio, &mut trades, &mut open_positions, &mut outcomes, &ids, &buy_inputs);
        let buy = outcome.signal_trade.expect("buy should fill");
        assert!((buy.base_amount - 0.742574).abs() < 1e-5);
        assert!((buy.cost_basis.unwrap() - 750.75).abs() < 1e-6);

        let mut sell_inputs = inputs(Action::Sell, 1030.0, -1.0, 1.0);
        sell_inputs.max_position_pct = 0.5;
        let outcome = TradeExecutor::execute_tick(&mut portfolio, &mut trades, &mut open_positions, &mut outcomes, &ids, &sell_inputs);
        let sell = outcome.signal_trade.expect("sell should fill");
        assert!((sell.base_amount - 0.371287).abs() < 1e-5);
        assert!((sell.pnl.unwrap() - 6.669).abs() < 1e-2);
        assert_eq!(portfolio.win_count, 1);
    }

    #[test]
    fn scenario_s3_atr_stop_forces_full_exit() {
        let mut portfolio = Portfolio::new(1000.0);
        let mut trades = Vec::new();
        let mut open_positions = Vec::new();
        let mut outcomes = Vec::new();
        let ids = CountingTradeIdGenerator::new();

        let stop_cfg = StopLossConfig { enabled: true, atr_multiplier: 2.0, trailing: true, atr_period: 14, use_ema: false };
        let buy_id = ids.next_id();
        let buy_trade = Trade {
            id: buy_id,
            timestamp: 0,
            kind: TradeKind::Buy,
            price: 1000.0,
            base_amount: 1.0,
            quote_amount: 1000.75,
            signal: 1.0,
            confidence: 1.0,
            portfolio_value_after: 1000.0,
            cost_basis: Some(1000.75),
            pnl: None,
            fully_sold: false,
        };
        trades.push(buy_trade);
        portfolio.base_balance = 1.0;
        portfolio.quote_balance = 0.0;
        open_positions.push(StopLossTracker::open(buy_id, 1000.0, 25.0, 2.0));

        TradeExecutor::execute_tick(
            &mut portfolio, &mut trades, &mut open_positions, &mut outcomes, &ids,
            &TickInputs { stop_loss: Some(&stop_cfg), ..inputs(Action::Hold, 1100.0, 0.0, 0.0) },
        );
        assert_eq!(open_positions[0].peak_price, 1100.0);
        assert_eq!(open_positions[0].stop_price, 1050.0);

        let outcome = TradeExecutor::execute_tick(
            &mut portfolio, &mut trades, &mut open_positions, &mut outcomes, &ids,
            &TickInputs { stop_loss: Some(&stop_cfg), ..inputs(Action::Hold, 1040.0, 0.0, 0.0) },
        );
        let exit = outcome.stop_loss_exit.expect("stop should fire");
        assert!((exit.pnl.unwrap() - 38.21).abs() < 1e-2);
        assert!(open_positions.is_empty());
        assert!(outcome.signal_trade.is_none());
    }

    #[test]
    fn min_position_size_skips_buy() {
        let mut portfolio = Portfolio::new(20.0);
        let mut trades = Vec::new();
        let mut open_positions = Vec::new();
        let mut outcomes = Vec::new();
        let ids = CountingTradeIdGenerator::new();

        let mut buy_inputs = inputs(Action::Buy, 1010.0, 1.0, 0.1);
        buy_inputs.max_position_pct = 0.1;
        let outcome = TradeExecutor::execute_tick(&mut portfolio, &mut trades, &mut open_positions, &mut outcomes, &ids, &buy_inputs);
        assert!(outcome.signal_trade.is_none());
        assert_eq!(portfolio.trade_count, 0);
    }

    #[test]
    fn price_movement_guard_skips_buy() {
        let mut portfolio = Portfolio::new(1000.0);
        let mut trades = Vec::new();
        let mut open_positions = Vec::new();
        let mut outcomes = Vec::new();
        let ids = CountingTradeIdGenerator::new();

        let mut buy_inputs = inputs(Action::Buy, 1100.0, 1.0, 1.0);
        buy_inputs.signal_price = 1000.0;
        let outcome = TradeExecutor::execute_tick(&mut portfolio, &mut trades, &mut open_positions, &mut outcomes, &ids, &buy_inputs);
        assert!(outcome.signal_trade.is_none());
    }

    #[test]
    fn recent_outcomes_capped_at_twenty() {
        let mut outcomes = Vec::new();
        for _ in 0..25 {
            TradeExecutor::record_outcome(&mut outcomes, true);
        }
        assert_eq!(outcomes.len(), 20);
    }
}
