//! C6 — ATR Stop-Loss Tracker (§4.6).
//!
//! Grounded on the teacher's `StopState` trailing-stop state machine
//! (`application/risk_management/trailing_stops.rs`), adapted to the
//! spec's `OpenPosition` shape and its frozen-ATR trailing rule: the ATR
//! used to compute the stop distance is captured once at entry and never
//! recomputed, even when the stop trails the rising peak (see DESIGN.md
//! for why `use_ema` does not additionally enable live-ATR trailing).

use crate::domain::config::StopLossConfig;
use crate::domain::trade::OpenPosition;
use uuid::Uuid;

pub struct StopLossTracker;

impl StopLossTracker {
    /// Creates an Open Position on a Buy fill (§4.6 "On Buy fill").
    pub fn open(buy_trade_id: Uuid, fill_price: f64, atr_at_entry: f64, atr_multiplier: f64) -> OpenPosition {
        OpenPosition {
            buy_trade_id,
            entry_price: fill_price,
            peak_price: fill_price,
            stop_price: fill_price - atr_multiplier * atr_at_entry,
            atr_at_entry,
        }
    }

    /// Updates the position's peak/stop on every tick before any new
    /// signal is evaluated. Returns `Some(exit_price)` when the current
    /// price has breached the stop — the caller must then force a Sell
    /// for the full lot (§4.7 Phase A) and drop this Open Position.
    pub fn update(position: &mut OpenPosition, current_price: f64, config: &StopLossConfig) -> Option<f64> {
        if config.trailing && current_price > position.peak_price {
            position.peak_price = current_price;
            position.stop_price = position.peak_price - config.atr_multiplier * position.atr_at_entry;
        }

        if current_price <= position.stop_price {
            Some(current_price)
        } else {
            None
        }
    }
}
