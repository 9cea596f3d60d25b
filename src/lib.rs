//! Paper-trading decision-and-execution core for a single volatile asset.
//!
//! The crate is organized the way the teacher splits its trading engine:
//! pure domain types and algorithms under [`domain`], the per-tick decision
//! chain (regime → strategy → arbiter → risk → sizing → execution) as
//! sibling modules, and the stateful orchestration/session layer on top.
//! Everything below [`orchestrator`] is synchronous and side-effect free;
//! [`ports`] is the only boundary across which the core talks to the
//! outside world (candle feeds, a KV store, a notification sink).

pub mod arbiter;
pub mod backtest;
pub mod domain;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod ports;
pub mod risk;
pub mod session;
pub mod strategy;
pub mod strategy_search;

pub use arbiter::{AdaptiveStrategyArbiter, ArbiterOutput};
pub use error::CoreError;
pub use executor::{ExecutionOutcome, TickInputs, TradeExecutor};
pub use orchestrator::Orchestrator;
pub use ports::{CandleSource, Clock, KvStore, NotificationEvent, NotificationSink, TradeIdGenerator};
pub use session::state::Session;
pub use session::store::SessionStore;
