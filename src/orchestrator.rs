//! C9 — Session Orchestrator (§4.9) and the public surface of §6
//! ("Outbound: the core offers"). Grounded on the teacher's
//! `application/risk_management/session_manager.rs` session-lifecycle
//! service and `application/system/*` bootstrap wiring: a thin struct
//! holding `Arc<dyn Trait>` collaborators, with one `async fn` per tick
//! that threads a per-session lock end to end.

use crate::arbiter::AdaptiveStrategyArbiter;
use crate::domain::candle::Candle;
use crate::domain::config::AdaptiveConfig;
use crate::domain::data_quality;
use crate::domain::indicators::atr;
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::regime::Regime;
use crate::error::CoreError;
use crate::executor::{ExecutionOutcome, TickInputs, TradeExecutor};
use crate::ports::{CandleSource, Clock, KvStore, NotificationEvent, NotificationSink, RandomTradeIdGenerator, TradeIdGenerator};
use crate::session::state::Session;
use crate::session::store::SessionStore;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const STALE_DATA_RETRIES: u32 = 3;
const MIN_CANDLES: usize = 50;

pub struct CleanupReport {
    pub cleaned: u32,
    pub errors: Vec<String>,
}

pub struct Orchestrator {
    store: SessionStore,
    candles: Arc<dyn CandleSource>,
    kv: Arc<dyn KvStore>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn TradeIdGenerator>,
}

impl Orchestrator {
    pub fn new(
        candles: Arc<dyn CandleSource>,
        kv: Arc<dyn KvStore>,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store: SessionStore::new(), candles, kv, notifications, clock, ids: Arc::new(RandomTradeIdGenerator) }
    }

    fn session_key(asset: &str) -> String {
        format!("paper:session:active:{asset}")
    }

    /// Fails with `SessionAlreadyActive` if an active session already
    /// exists for `asset` (§6).
    pub async fn start_session(&self, config: AdaptiveConfig, asset: String, name: Option<String>) -> Result<Session, CoreError> {
        config.validate()?;
        let now = self.clock.now_ms();
        let session = Session::new(Uuid::new_v4(), asset.clone(), name, config, now);
        let handle = self.store.insert_new(session)?;
        let guard = handle.lock().await;
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    pub async fn get_active_session(&self, asset: &str) -> Option<Session> {
        let handle = self.store.get_active_by_asset(asset)?;
        let guard = handle.lock().await;
        Some(guard.clone())
    }

    pub async fn set_emergency_stop(&self, session_id: Uuid, active: bool) -> Result<Session, CoreError> {
        let handle = self.store.get(session_id).ok_or(CoreError::SessionNotFound { session_id: session_id.to_string() })?;
        let mut guard = handle.lock().await;
        guard.is_emergency_stopped = active;
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    /// Flips `is_active = false`, drops the asset reservation and rolling
    /// histories implicitly (the session handle itself is released from
    /// the store), and persists. Safe to call once; a second call raises
    /// `SessionNotActive`.
    pub async fn stop_session(&self, session_id: Uuid) -> Result<Session, CoreError> {
        let handle = self.store.get(session_id).ok_or(CoreError::SessionNotFound { session_id: session_id.to_string() })?;
        let mut guard = handle.lock().await;
        if !guard.is_active {
            return Err(CoreError::SessionNotActive { session_id: session_id.to_string() });
        }
        guard.is_active = false;
        guard.stopped_at = Some(self.clock.now_ms());
        let snapshot = guard.clone();
        let asset = guard.asset.clone();
        drop(guard);
        self.store.release_asset(&asset);
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    /// The tick entrypoint (§4.9 steps 1–9). Acquires the session's lock
    /// for the full tick duration so a second concurrent tick for the
    /// same session id waits rather than interleaving (§5).
    #[instrument(skip(self), fields(asset))]
    pub async fn update_session(&self, session_id: Uuid, fill_all_gaps: bool) -> Result<Session, CoreError> {
        let handle = self.store.get(session_id).ok_or(CoreError::SessionNotFound { session_id: session_id.to_string() })?;
        let mut session = handle.lock().await;

        if !session.is_active {
            return Err(CoreError::SessionNotActive { session_id: session_id.to_string() });
        }

        tracing::Span::current().record("asset", tracing::field::display(&session.asset));

        let now = self.clock.now_ms();
        let timeframe = session.config.bullish.timeframe;
        let start = if fill_all_gaps { session.started_at } else { session.last_update };

        let candles = match self.fetch_with_stale_retry(&session.asset, timeframe, start, now).await {
            Ok(candles) => candles,
            Err(CoreError::FetchFailure { reason }) => {
                let snapshot = self.fallback_to_price_estimate(&mut session, reason, now)?;
                drop(session);
                self.persist(&snapshot).await?;
                return Ok(snapshot);
            }
            Err(e) => return Err(e),
        };

        if candles.len() < MIN_CANDLES {
            return Err(CoreError::InsufficientData { required: MIN_CANDLES, actual: candles.len() });
        }

        let report = data_quality::assess(&candles, timeframe, now);
        if !report.is_within_tolerance() {
            warn!(gap_count = report.gap_count, coverage_pct = report.coverage_pct, "data quality degraded");
            self.notifications
                .emit(NotificationEvent::DataQuality {
                    session_id: session_id.to_string(),
                    asset: session.asset.clone(),
                    message: format!("coverage {:.1}%, {} gaps", report.coverage_pct * 100.0, report.gap_count),
                })
                .await;
        }

        let i = candles.len() - 1;
        let current_price = candles[i].close;
        let timestamp = candles[i].timestamp;

        let previous_regime = session.regime_persistence_window.last().copied().unwrap_or(Regime::Neutral);
        let preview = crate::domain::regime::MarketRegimeDetector::detect(&candles, i, previous_regime, None);
        session.push_persistence_window(preview.regime);
        session.push_regime_if_changed(timestamp, preview.regime);

        let returns_stdev = preview.volatility;
        let risk_ctx = crate::risk::filters::RiskFilterContext {
            returns_stdev,
            regime_history: &session.regime_persistence_window,
            recent_outcomes: &session.recent_outcomes,
            peak_value: session.peak_value,
            current_value: session.portfolio.total_value,
            is_emergency_stopped: session.is_emergency_stopped,
        };

        let arbiter_out = AdaptiveStrategyArbiter::arbitrate(
            &candles,
            i,
            &session.config,
            previous_regime,
            &session.regime_persistence_window,
            &risk_ctx,
            &session.trades,
            None,
        );

        let severity = crate::risk::filters::RiskFilterPipeline::severity(&risk_ctx, &session.config);
        if arbiter_out.risk_block.is_none() && (severity.drawdown.is_any_halt() || severity.circuit_breaker.is_any_halt()) {
            warn!(
                drawdown_level = ?severity.drawdown,
                circuit_breaker_level = ?severity.circuit_breaker,
                "risk filter approaching its limit"
            );
        }

        if let Some(strategy) = &arbiter_out.active_strategy {
            session.push_strategy_switch_if_changed(timestamp, &strategy.name);
        }

        // Copied out of `session.config` before any mutable borrow of
        // `session`'s other fields, so the two don't alias for the borrow
        // checker (`StopLossConfig` is `Copy`).
        let stop_loss_cfg = session.config.stop_loss;
        let min_position_size = session.config.min_position_size;
        let price_validation_threshold = session.config.price_validation_threshold;
        let max_bullish_position = session.config.max_bullish_position;

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

        let outcome: ExecutionOutcome = TradeExecutor::execute_tick(
            &mut session.portfolio,
            &mut session.trades,
            &mut session.open_positions,
            &mut session.recent_outcomes,
            self.ids.as_ref(),
            &tick_inputs,
        );

        session.update_drawdown_tracker();

        session.push_portfolio_snapshot(PortfolioSnapshot {
            timestamp,
            quote_balance: session.portfolio.quote_balance,
            base_balance: session.portfolio.base_balance,
            total_value: session.portfolio.total_value,
            price: current_price,
        });

        session.last_signal = Some(arbiter_out.signal);
        session.last_action = Some(arbiter_out.action);
        session.last_price = Some(current_price);
        session.last_update = now;
        session.expires_at = now + 90 * 24 * 60 * 60 * 1000;

        let snapshot = session.clone();
        drop(session);

        self.persist(&snapshot).await?;
        self.emit_tick_events(&snapshot, &outcome, &arbiter_out.regime, previous_regime).await;

        Ok(snapshot)
    }

    /// §7 `StaleData`: retries the fetch up to 3 times with a short
    /// back-off before raising; an empty-or-short result does not count
    /// as staleness (that's `InsufficientData`, checked by the caller).
    async fn fetch_with_stale_retry(
        &self,
        asset: &str,
        timeframe: crate::domain::candle::Timeframe,
        start: i64,
        now: i64,
    ) -> Result<Vec<Candle>, CoreError> {
        let tolerance = (timeframe.to_millis() as f64 * 1.5) as i64;
        let mut last_err = None;
        for attempt in 0..=STALE_DATA_RETRIES {
            match self.candles.fetch(asset, timeframe, start, now).await {
                Ok(candles) => {
                    if let Some(last) = candles.last() {
                        let age = now - last.timestamp;
                        if age <= tolerance || attempt == STALE_DATA_RETRIES {
                            return Ok(candles);
                        }
                        last_err = Some(CoreError::StaleData { age_ms: age, tolerance_ms: tolerance });
                    } else {
                        return Ok(candles);
                    }
                }
                Err(e) => return Err(self.recover_from_fetch_failure(e, now).await),
            }
        }
        Err(last_err.unwrap_or(CoreError::StaleData { age_ms: 0, tolerance_ms: tolerance }))
    }

    /// §7 `FetchFailure` fallback: estimate from the last snapshot only
    /// when the estimate is sane; otherwise propagate the failure.
    async fn recover_from_fetch_failure(&self, err: crate::error::FetchError, _now: i64) -> CoreError {
        CoreError::FetchFailure { reason: err.0 }
    }

    /// §7: "orchestrator may fall back to an estimated price derived from
    /// the last portfolio snapshot only if base balance > 0 and the
    /// estimate is within a sanity band (0 < estimate < 10x typical
    /// price); otherwise aborts." No new candle data means no new regime
    /// detection or arbitration — the tick just re-marks the book at the
    /// last known price and records a snapshot.
    fn fallback_to_price_estimate(&self, session: &mut Session, reason: String, now: i64) -> Result<Session, CoreError> {
        let fail = || CoreError::FetchFailure { reason: reason.clone() };
        let last_price = session.last_price.ok_or_else(fail)?;
        if session.portfolio.base_balance <= 0.0 {
            return Err(fail());
        }
        let estimate = last_price;
        let typical_price = last_price;
        if !(estimate > 0.0 && estimate.is_finite() && estimate < typical_price * 10.0) {
            return Err(fail());
        }

        warn!(reason = %reason, estimate, "fetch failed, falling back to last-snapshot price estimate");
        session.portfolio.total_value = session.portfolio.quote_balance + session.portfolio.base_balance * estimate;
        session.update_drawdown_tracker();
        session.push_portfolio_snapshot(PortfolioSnapshot {
            timestamp: now,
            quote_balance: session.portfolio.quote_balance,
            base_balance: session.portfolio.base_balance,
            total_value: session.portfolio.total_value,
            price: estimate,
        });
        session.last_price = Some(estimate);
        session.last_update = now;
        Ok(session.clone())
    }

    async fn persist(&self, session: &Session) -> Result<(), CoreError> {
        let bytes = serde_json::to_vec(session).map_err(|e| CoreError::PersistenceError { reason: e.to_string() })?;
        self.kv.put(&Self::session_key(&session.asset), bytes).await
    }

    async fn emit_tick_events(&self, session: &Session, outcome: &ExecutionOutcome, regime: &crate::domain::regime::RegimeSignal, previous_regime: Regime) {
        if regime.regime != previous_regime {
            self.notifications
                .emit(NotificationEvent::RegimeChanged {
                    session_id: session.id.to_string(),
                    asset: session.asset.clone(),
                    from: format!("{:?}", previous_regime),
                    to: format!("{:?}", regime.regime),
                })
                .await;
        }

        for trade in [&outcome.stop_loss_exit, &outcome.signal_trade].into_iter().flatten() {
            let kind = match trade.kind {
                crate::domain::trade::TradeKind::Buy => "buy",
                crate::domain::trade::TradeKind::Sell => "sell",
            };
            info!(kind, price = trade.price, base_amount = trade.base_amount, "trade executed");
            self.notifications
                .emit(NotificationEvent::TradeExecuted {
                    session_id: session.id.to_string(),
                    asset: session.asset.clone(),
                    kind: kind.to_string(),
                    price: trade.price,
                    base_amount: trade.base_amount,
                })
                .await;
        }

        if session.current_drawdown >= session.config.max_drawdown_threshold {
            self.notifications
                .emit(NotificationEvent::ThresholdBreached {
                    session_id: session.id.to_string(),
                    asset: session.asset.clone(),
                    metric: "drawdown".to_string(),
                    value: session.current_drawdown,
                })
                .await;
        }
    }

    /// Periodic job (§6, §4.9 "background sweep"): stops every session for
    /// which `is_active && (now - last_update) > 90 days`.
    pub async fn cleanup_expired_sessions(&self) -> CleanupReport {
        let now = self.clock.now_ms();
        let mut cleaned = 0u32;
        let mut errors = Vec::new();

        for id in self.store.all_ids() {
            let Some(handle) = self.store.get(id) else { continue };
            let expired = {
                let guard = handle.lock().await;
                guard.is_expired(now)
            };
            if expired {
                match self.stop_session(id).await {
                    Ok(_) => cleaned += 1,
                    Err(e) => errors.push(e.to_string()),
                }
            }
        }

        CleanupReport { cleaned, errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::candle::Timeframe;
    use crate::domain::config::{IndicatorConfig, IndicatorKind, StrategyConfig};
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, Ordering};
    use tokio::sync::Mutex as AsyncMutex;

    struct FixedCandles(Vec<Candle>);

    #[async_trait]
    impl CandleSource for FixedCandles {
        async fn fetch(&self, _symbol: &str, _tf: Timeframe, _start: i64, _end: i64) -> Result<Vec<Candle>, FetchError> {
            Ok(self.0.clone())
        }
    }

    struct InMemoryKv(AsyncMutex<std::collections::HashMap<String, Vec<u8>>>);

    #[async_trait]
    impl KvStore for InMemoryKv {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
            Ok(self.0.lock().await.get(key).cloned())
        }
        async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), CoreError> {
            self.0.lock().await.insert(key.to_string(), value);
            Ok(())
        }
    }

    struct NoopSink;
    #[async_trait]
    impl NotificationSink for NoopSink {
        async fn emit(&self, _event: NotificationEvent) {}
    }

    struct FixedClock(AtomicI64);
    impl Clock for FixedClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn candles_from_closes(closes: &[f64], interval: i64) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(idx, &c)| Candle { timestamp: idx as i64 * interval, open: c, high: c, low: c, close: c, volume: 1.0 })
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

    fn orchestrator(closes: &[f64]) -> Orchestrator {
        let interval = Timeframe::OneHour.to_millis();
        let candles = candles_from_closes(closes, interval);
        let now = candles.last().unwrap().timestamp;
        Orchestrator {
            store: SessionStore::new(),
            candles: Arc::new(FixedCandles(candles)),
            kv: Arc::new(InMemoryKv(AsyncMutex::new(std::collections::HashMap::new()))),
            notifications: Arc::new(NoopSink),
            clock: Arc::new(FixedClock(AtomicI64::new(now))),
            ids: Arc::new(RandomTradeIdGenerator),
        }
    }

    #[tokio::test]
    async fn starting_second_session_for_same_asset_fails() {
        let orch = orchestrator(&vec![100.0; 60]);
        orch.start_session(config(), "ETH".into(), None).await.unwrap();
        let err = orch.start_session(config(), "ETH".into(), None).await.unwrap_err();
        assert!(matches!(err, CoreError::SessionAlreadyActive { .. }));
    }

    #[tokio::test]
    async fn tick_with_insufficient_candles_aborts() {
        let orch = orchestrator(&vec![100.0; 10]);
        let session = orch.start_session(config(), "ETH".into(), None).await.unwrap();
        let err = orch.update_session(session.id, true).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientData { .. }));
    }

    #[tokio::test]
    async fn tick_updates_regime_history_and_snapshot() {
        let closes: Vec<f64> = (0..80).map(|x| 100.0 + x as f64).collect();
        let orch = orchestrator(&closes);
        let session = orch.start_session(config(), "ETH".into(), None).await.unwrap();
        let updated = orch.update_session(session.id, true).await.unwrap();
        assert_eq!(updated.portfolio_history.len(), 1);
        assert!(!updated.regime_persistence_window.is_empty());
    }

    #[tokio::test]
    async fn stop_session_is_rejected_twice() {
        let orch = orchestrator(&vec![100.0; 60]);
        let session = orch.start_session(config(), "ETH".into(), None).await.unwrap();
        orch.stop_session(session.id).await.unwrap();
        let err = orch.stop_session(session.id).await.unwrap_err();
        assert!(matches!(err, CoreError::SessionNotActive { .. }));
    }

    struct FailingCandles;
    #[async_trait]
    impl CandleSource for FailingCandles {
        async fn fetch(&self, _symbol: &str, _tf: Timeframe, _start: i64, _end: i64) -> Result<Vec<Candle>, FetchError> {
            Err(FetchError("upstream unavailable".into()))
        }
    }

    #[tokio::test]
    async fn fetch_failure_falls_back_to_last_price_when_sane() {
        let orch = orchestrator(&vec![100.0; 60]);
        let session = orch.start_session(config(), "ETH".into(), None).await.unwrap();
        {
            let handle = orch.store.get(session.id).unwrap();
            let mut guard = handle.lock().await;
            guard.portfolio.base_balance = 2.0;
            guard.portfolio.quote_balance = 50.0;
            guard.last_price = Some(100.0);
        }
        let orch = Orchestrator { candles: Arc::new(FailingCandles), ..orch };

        let updated = orch.update_session(session.id, true).await.unwrap();
        assert_eq!(updated.portfolio.total_value, 50.0 + 2.0 * 100.0);
        assert_eq!(updated.portfolio_history.last().unwrap().price, 100.0);
    }

    #[tokio::test]
    async fn fetch_failure_aborts_when_no_base_balance_to_estimate_from() {
        let orch = orchestrator(&vec![100.0; 60]);
        let session = orch.start_session(config(), "ETH".into(), None).await.unwrap();
        let orch = Orchestrator { candles: Arc::new(FailingCandles), ..orch };

        let err = orch.update_session(session.id, true).await.unwrap_err();
        assert!(matches!(err, CoreError::FetchFailure { .. }));
    }

    #[tokio::test]
    async fn emergency_stop_blocks_new_entries() {
        let closes: Vec<f64> = (0..80).map(|x| 100.0 + x as f64 * 2.0).collect();
        let orch = orchestrator(&closes);
        let session = orch.start_session(config(), "ETH".into(), None).await.unwrap();
        orch.set_emergency_stop(session.id, true).await.unwrap();
        let updated = orch.update_session(session.id, true).await.unwrap();
        assert_eq!(updated.portfolio.trade_count, 0);
    }
}
