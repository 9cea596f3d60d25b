//! C5 — Kelly Sizer (§4.5).

use crate::domain::config::KellyConfig;
use crate::domain::trade::{Trade, TradeKind};

pub struct KellySizer;

impl KellySizer {
    /// Fractional-Kelly multiplier in `[0,1]`, dimensionless relative to
    /// the strategy's own `max_position_pct`. `1.0` means "use the
    /// strategy's configured size unchanged" (insufficient history, or a
    /// non-positive Kelly fraction).
    ///
    /// `completed_sells` must be ordered oldest-first; only the last
    /// `config.lookback_period` entries are used.
    pub fn multiplier(completed_sells: &[Trade], config: &KellyConfig, max_position_pct: f64) -> f64 {
        let sells: Vec<&Trade> = completed_sells
            .iter()
            .filter(|t| t.kind == TradeKind::Sell && t.pnl.is_some())
            .collect();

        if sells.len() < config.min_trades {
            return 1.0;
        }

        let lookback = sells.len().min(config.lookback_period);
        let recent = &sells[sells.len() - lookback..];

        let mut wins = 0usize;
        let mut total_win = 0.0;
        let mut total_loss = 0.0;
        let mut loss_count = 0usize;

        for t in recent {
            let pnl = t.pnl.unwrap_or(0.0);
            if pnl > 0.0 {
                wins += 1;
                total_win += pnl;
            } else if pnl < 0.0 {
                loss_count += 1;
                total_loss += -pnl;
            }
        }

        let total = recent.len();
        let win_rate = wins as f64 / total as f64;

        if wins == 0 || loss_count == 0 {
            return 1.0;
        }

        let avg_win = total_win / wins as f64;
        let avg_loss = total_loss / loss_count as f64;
        if avg_loss <= 0.0 {
            return 1.0;
        }
        let payoff = avg_win / avg_loss;

        let f_star = win_rate - (1.0 - win_rate) / payoff;
        if f_star <= 0.0 {
            return 1.0;
        }

        let f = f_star * config.fractional_multiplier;
        let target_frac = f.clamp(0.0, max_position_pct);
        if max_position_pct <= 0.0 {
            1.0
        } else {
            target_frac / max_position_pct
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sell(pnl: f64) -> Trade {
        Trade {
            id: Uuid::nil(),
            timestamp: 0,
            kind: TradeKind::Sell,
            price: 100.0,
            base_amount: 1.0,
            quote_amount: 100.0,
            signal: -0.5,
            confidence: 0.5,
            portfolio_value_after: 1000.0,
            cost_basis: None,
            pnl: Some(pnl),
            fully_sold: false,
        }
    }

    #[test]
    fn below_min_trades_returns_one() {
        let config = KellyConfig { enabled: true, fractional_multiplier: 0.25, min_trades: 20, lookback_period: 20 };
        let sells: Vec<Trade> = (0..5).map(|_| sell(10.0)).collect();
        assert_eq!(KellySizer::multiplier(&sells, &config, 0.9), 1.0);
    }

    #[test]
    fn scenario_s6_matches_spec() {
        let config = KellyConfig { enabled: true, fractional_multiplier: 0.25, min_trades: 20, lookback_period: 20 };
        let mut sells: Vec<Trade> = Vec::new();
        for _ in 0..12 {
            sells.push(sell(10.0));
        }
        for _ in 0..8 {
            sells.push(sell(-5.0));
        }
        let multiplier = KellySizer::multiplier(&sells, &config, 0.9);
        assert!((multiplier - 0.1111111111).abs() < 1e-6);
    }

    #[test]
    fn negative_kelly_fraction_returns_one() {
        let config = KellyConfig { enabled: true, fractional_multiplier: 0.25, min_trades: 5, lookback_period: 20 };
        let mut sells: Vec<Trade> = Vec::new();
        for _ in 0..3 {
            sells.push(sell(1.0));
        }
        for _ in 0..7 {
            sells.push(sell(-10.0));
        }
        assert_eq!(KellySizer::multiplier(&sells, &config, 0.9), 1.0);
    }
}
