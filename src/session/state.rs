//! Session data model (§3, §4.9, §4.10).

use crate::domain::config::AdaptiveConfig;
use crate::domain::portfolio::{Portfolio, PortfolioSnapshot};
use crate::domain::regime::Regime;
use crate::domain::trade::{OpenPosition, Trade};
use crate::strategy::signal::Action;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;
const PORTFOLIO_HISTORY_CAP: usize = 1000;
const REGIME_LOG_CAP: usize = 100;
const STRATEGY_SWITCH_CAP: usize = 50;
const PERSISTENCE_WINDOW_CAP: usize = 10;
const RECENT_OUTCOMES_CAP: usize = 20;
const SESSION_TTL_MS: i64 = 90 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeLogEntry {
    pub timestamp: i64,
    pub regime: Regime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySwitch {
    pub timestamp: i64,
    pub strategy_name: String,
}

/// The single persisted record for one asset's paper-trading session
/// (§6 "Persisted state layout", key `paper:session:active:{asset}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub asset: String,
    pub name: Option<String>,
    pub config: AdaptiveConfig,

    pub started_at: i64,
    pub stopped_at: Option<i64>,
    pub is_active: bool,
    pub is_emergency_stopped: bool,

    pub portfolio: Portfolio,
    pub trades: Vec<Trade>,
    pub open_positions: Vec<OpenPosition>,

    pub portfolio_history: Vec<PortfolioSnapshot>,
    /// Append-on-change audit log, capped at 100 (§4.9 step 6).
    pub regime_history: Vec<RegimeLogEntry>,
    /// Every-tick rolling window, capped at 10 (§4.10); persistence and
    /// whipsaw checks read its last-5 suffix.
    pub regime_persistence_window: Vec<Regime>,
    pub strategy_switches: Vec<StrategySwitch>,
    pub recent_outcomes: Vec<bool>,

    pub last_signal: Option<f64>,
    pub last_action: Option<Action>,
    pub last_price: Option<f64>,
    pub last_update: i64,
    pub active_strategy_name: Option<String>,

    pub peak_value: f64,
    pub current_drawdown: f64,

    pub expires_at: i64,
    pub schema_version: u32,
}

impl Session {
    pub fn new(id: Uuid, asset: String, name: Option<String>, config: AdaptiveConfig, now_ms: i64) -> Self {
        let initial_capital = config.bullish.initial_capital;
        Self {
            id,
            asset,
            name,
            config,
            started_at: now_ms,
            stopped_at: None,
            is_active: true,
            is_emergency_stopped: false,
            portfolio: Portfolio::new(initial_capital),
            trades: Vec::new(),
            open_positions: Vec::new(),
            portfolio_history: Vec::new(),
            regime_history: Vec::new(),
            regime_persistence_window: Vec::new(),
            strategy_switches: Vec::new(),
            recent_outcomes: Vec::new(),
            last_signal: None,
            last_action: None,
            last_price: None,
            last_update: now_ms,
            active_strategy_name: None,
            peak_value: initial_capital,
            current_drawdown: 0.0,
            expires_at: now_ms + SESSION_TTL_MS,
            schema_version: CURRENT_SCHEMA_VERSION,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.is_active && (now_ms - self.last_update) > SESSION_TTL_MS
    }

    /// §4.9 step 5: append, cap at 1000, dedupe by timestamp.
    pub fn push_portfolio_snapshot(&mut self, snapshot: PortfolioSnapshot) {
        if self.portfolio_history.last().map(|s| s.timestamp) == Some(snapshot.timestamp) {
            return;
        }
        self.portfolio_history.push(snapshot);
        if self.portfolio_history.len() > PORTFOLIO_HISTORY_CAP {
            self.portfolio_history.remove(0);
        }
    }

    /// §4.9 step 6 — the append-on-change audit log.
    pub fn push_regime_if_changed(&mut self, timestamp: i64, regime: Regime) {
        if self.regime_history.last().map(|e| e.regime) != Some(regime) {
            self.regime_history.push(RegimeLogEntry { timestamp, regime });
            if self.regime_history.len() > REGIME_LOG_CAP {
                self.regime_history.remove(0);
            }
        }
    }

    /// §4.10 — every-tick rolling window used by persistence and whipsaw checks.
    pub fn push_persistence_window(&mut self, regime: Regime) {
        self.regime_persistence_window.push(regime);
        if self.regime_persistence_window.len() > PERSISTENCE_WINDOW_CAP {
            self.regime_persistence_window.remove(0);
        }
    }

    pub fn push_strategy_switch_if_changed(&mut self, timestamp: i64, strategy_name: &str) {
        if self.active_strategy_name.as_deref() != Some(strategy_name) {
            self.active_strategy_name = Some(strategy_name.to_string());
            self.strategy_switches.push(StrategySwitch { timestamp, strategy_name: strategy_name.to_string() });
            if self.strategy_switches.len() > STRATEGY_SWITCH_CAP {
                self.strategy_switches.remove(0);
            }
        }
    }

    pub fn push_recent_outcome(&mut self, win: bool) {
        self.recent_outcomes.push(win);
        if self.recent_outcomes.len() > RECENT_OUTCOMES_CAP {
            self.recent_outcomes.remove(0);
        }
    }

    /// §4.10 — `peak_value = max(peak_value, total_value)`, drawdown clamped at 0.
    pub fn update_drawdown_tracker(&mut self) {
        self.peak_value = self.peak_value.max(self.portfolio.total_value);
        self.current_drawdown = if self.peak_value > 0.0 {
            ((self.peak_value - self.portfolio.total_value) / self.peak_value).max(0.0)
        } else {
            0.0
        };
    }

    pub fn reset_drawdown(&mut self, initial_value: f64) {
        self.peak_value = initial_value;
        self.current_drawdown = 0.0;
    }
}
