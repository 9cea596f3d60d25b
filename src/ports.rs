//! Collaborator boundary (§6). These traits are the only I/O the core ever
//! calls; everything else inside a tick is synchronous and pure. Mirrors the
//! teacher's `domain::ports::{MarketDataService, ExecutionService}` shape,
//! narrowed to the four capabilities spec.md §6 names plus the id-generator
//! determinism hook from §9.

use crate::domain::candle::{Candle, Timeframe};
use crate::error::{CoreError, FetchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Returns gap-checked, sorted candles; the last one must be the most
    /// recent for which `close` is known.
    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>, FetchError>;
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), CoreError>;
}

/// Events the orchestrator routes to the sink (§4.9 step 9). Delivery is
/// best-effort from the core's perspective — failures are logged by the
/// sink's own implementation, never surfaced as a tick failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotificationEvent {
    TradeExecuted { session_id: String, asset: String, kind: String, price: f64, base_amount: f64 },
    RegimeChanged { session_id: String, asset: String, from: String, to: String },
    ThresholdBreached { session_id: String, asset: String, metric: String, value: f64 },
    DataQuality { session_id: String, asset: String, message: String },
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn emit(&self, event: NotificationEvent);
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Operationalizes §9's "accept an injected id generator" determinism note.
/// The default implementation wraps `Uuid::new_v4`; tests inject a
/// deterministic counter-backed one.
pub trait TradeIdGenerator: Send + Sync {
    fn next_id(&self) -> Uuid;
}

pub struct RandomTradeIdGenerator;

impl TradeIdGenerator for RandomTradeIdGenerator {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

#[cfg(test)]
pub struct CountingTradeIdGenerator {
    counter: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl CountingTradeIdGenerator {
    pub fn new() -> Self {
        Self { counter: std::sync::atomic::AtomicU64::new(1) }
    }
}

#[cfg(test)]
impl TradeIdGenerator for CountingTradeIdGenerator {
    fn next_id(&self) -> Uuid {
        let n = self.counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Uuid::from_u128(n as u128)
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}
