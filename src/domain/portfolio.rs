//! Portfolio data model (§3). Money is `f64` throughout the core, per
//! §4.7's numeric-semantics note (see DESIGN.md for why this crate uses
//! plain floats rather than a fixed-point decimal type).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Portfolio {
    pub quote_balance: f64,
    pub base_balance: f64,
    pub total_value: f64,
    pub initial_capital: f64,
    pub total_return_pct: f64,
    pub trade_count: u64,
    pub win_count: u64,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            quote_balance: initial_capital,
            base_balance: 0.0,
            total_value: initial_capital,
            initial_capital,
            total_return_pct: 0.0,
            trade_count: 0,
            win_count: 0,
        }
    }

    /// Recomputes `total_value` and `total_return_pct` against the given
    /// mark price. Called as the last step of every executor phase (§4.7
    /// Phase C).
    pub fn mark_to_market(&mut self, current_price: f64) {
        self.total_value = self.quote_balance + self.base_balance * current_price;
        self.total_return_pct = if self.initial_capital > 0.0 {
            (self.total_value - self.initial_capital) / self.initial_capital * 100.0
        } else {
            0.0
        };
    }

    pub fn win_rate(&self) -> f64 {
        if self.trade_count == 0 {
            0.0
        } else {
            self.win_count as f64 / self.trade_count as f64
        }
    }
}

/// A `{timestamp, quote, base, total_value, price}` record appended to the
/// session's rolling portfolio history (§4.9 step 5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: i64,
    pub quote_balance: f64,
    pub base_balance: f64,
    pub total_value: f64,
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_to_market_recomputes_total_value() {
        let mut p = Portfolio::new(1000.0);
        p.quote_balance = 250.0;
        p.base_balance = 0.5;
        p.mark_to_market(1500.0);
        assert_eq!(p.total_value, 250.0 + 0.5 * 1500.0);
        assert!((p.total_return_pct - ((1000.0 - 1000.0) / 1000.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn win_rate_zero_trades_is_zero() {
        let p = Portfolio::new(1000.0);
        assert_eq!(p.win_rate(), 0.0);
    }
}
