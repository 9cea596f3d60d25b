//! Trade and Open Position data model (§3).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeKind {
    Buy,
    Sell,
}

/// A fill against the portfolio. Buy trades are mutated in place as later
/// Sells consume them FIFO (`base_amount`/`cost_basis` decremented,
/// `fully_sold` flipped) — the teacher's convention for lot bookkeeping,
/// mirrored here rather than a side-car lot table, per §9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub timestamp: i64,
    pub kind: TradeKind,
    pub price: f64,
    pub base_amount: f64,
    pub quote_amount: f64,
    pub signal: f64,
    pub confidence: f64,
    pub portfolio_value_after: f64,
    /// Buy only: the quote cost (including fee) originally paid for this lot.
    pub cost_basis: Option<f64>,
    /// Sell only: realized P&L for this sell.
    pub pnl: Option<f64>,
    /// Buy only: mutated to `true` once FIFO consumption exhausts the lot.
    pub fully_sold: bool,
}

/// One still-open Buy lot under ATR stop-loss management (§4.6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OpenPosition {
    pub buy_trade_id: Uuid,
    pub entry_price: f64,
    pub peak_price: f64,
    pub stop_price: f64,
    pub atr_at_entry: f64,
}
