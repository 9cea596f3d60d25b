//! Per-session registry (§4.10 design note, §5 concurrency model).
//!
//! Mirrors the teacher's `Arc<RwLock<...>>`/`Arc<Mutex<...>>` state
//! containers in `application/risk_management/state/*.rs`: a process-wide
//! map guarded by a coarse lock for membership, with a fine-grained
//! `tokio::sync::Mutex` per session so concurrent ticks on different
//! sessions never block each other (§5 "Cross-session parallelism").

use crate::error::CoreError;
use crate::session::state::Session;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<Uuid, Arc<AsyncMutex<Session>>>>,
    active_by_asset: Mutex<HashMap<String, Uuid>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self { sessions: Mutex::new(HashMap::new()), active_by_asset: Mutex::new(HashMap::new()) }
    }

    pub fn insert_new(&self, session: Session) -> Result<Arc<AsyncMutex<Session>>, CoreError> {
        let mut active = self.active_by_asset.lock().expect("active_by_asset poisoned");
        if active.contains_key(&session.asset) {
            return Err(CoreError::SessionAlreadyActive { asset: session.asset.clone() });
        }
        let id = session.id;
        let asset = session.asset.clone();
        let handle = Arc::new(AsyncMutex::new(session));
        self.sessions.lock().expect("sessions poisoned").insert(id, handle.clone());
        active.insert(asset, id);
        Ok(handle)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<AsyncMutex<Session>>> {
        self.sessions.lock().expect("sessions poisoned").get(&id).cloned()
    }

    pub fn get_active_by_asset(&self, asset: &str) -> Option<Arc<AsyncMutex<Session>>> {
        let id = *self.active_by_asset.lock().expect("active_by_asset poisoned").get(asset)?;
        self.get(id)
    }

    /// Drops the asset reservation so a new session can be started for it;
    /// the session handle itself remains retrievable by id.
    pub fn release_asset(&self, asset: &str) {
        self.active_by_asset.lock().expect("active_by_asset poisoned").remove(asset);
    }

    pub fn all_ids(&self) -> Vec<Uuid> {
        self.sessions.lock().expect("sessions poisoned").keys().copied().collect()
    }

    pub fn remove(&self, id: Uuid) {
        self.sessions.lock().expect("sessions poisoned").remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Timeframe;
    use crate::domain::config::{AdaptiveConfig, IndicatorConfig, IndicatorKind, StrategyConfig};

    fn config() -> AdaptiveConfig {
        let strategy = StrategyConfig {
            name: "s".into(),
            timeframe: Timeframe::OneHour,
            indicators: vec![IndicatorConfig { kind: IndicatorKind::Rsi { period: 14 }, weight: 1.0 }],
            buy_threshold: 0.3,
            sell_threshold: -0.3,
            max_position_pct: 0.5,
            initial_capital: 1000.0,
        };
        AdaptiveConfig {
            bullish: strategy.clone(),
            bearish: strategy.clone(),
            neutral: Some(strategy),
            regime_confidence_threshold: 0.5,
            momentum_confirmation_threshold: 0.3,
            regime_persistence_periods: 3,
            bullish_position_multiplier: 1.0,
            dynamic_position_sizing: true,
            max_bullish_position: 0.9,
            max_volatility: 0.05,
            circuit_breaker_win_rate: 0.4,
            circuit_breaker_lookback: 20,
            whipsaw_detection_periods: 5,
            whipsaw_max_changes: 2,
            max_drawdown_threshold: 0.2,
            kelly: None,
            stop_loss: None,
            price_validation_threshold: 0.02,
            min_position_size: 10.0,
        }
    }

    #[test]
    fn second_session_for_same_asset_is_rejected() {
        let store = SessionStore::new();
        let s1 = Session::new(Uuid::new_v4(), "ETH".into(), None, config(), 0);
        store.insert_new(s1).expect("first session should register");

        let s2 = Session::new(Uuid::new_v4(), "ETH".into(), None, config(), 0);
        let err = store.insert_new(s2).unwrap_err();
        assert!(matches!(err, CoreError::SessionAlreadyActive { .. }));
    }

    #[test]
    fn get_active_by_asset_resolves_handle() {
        let store = SessionStore::new();
        let id = Uuid::new_v4();
        let s = Session::new(id, "BTC".into(), None, config(), 0);
        store.insert_new(s).unwrap();
        assert!(store.get_active_by_asset("BTC").is_some());
        assert!(store.get_active_by_asset("SOL").is_none());
    }
}
